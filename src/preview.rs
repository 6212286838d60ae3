//! Live preview: debounced rendering with last-initiated-wins ordering.
//!
//! Every parameter change goes through [`PreviewController::submit`], which
//! bumps a shared [`GenerationCounter`] and schedules a render after a quiet
//! period. Each request moves through
//!
//! ```text
//! Idle → Pending → Rendering → Displayed | Discarded | Failed
//! ```
//!
//! Staleness is checked twice against the counter: when the debounce window
//! elapses (a superseded request never renders) and when the render
//! completes (a late result is dropped instead of shown). In-flight work is
//! never aborted; an older render that finishes after a newer one is simply
//! discarded, so the displayed result always belongs to the latest submit.
//!
//! Results are delivered as [`PreviewEvent`]s on an unbounded tokio channel.

use crate::transcode::{
    Codec, EncodedResult, RenderOptions, SourceImage, TranscodeError, Transcoder,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(350);

/// Monotonic request counter shared between the controller and its tasks.
#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return it.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Parameter snapshot tagged with the generation that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest<P> {
    pub params: P,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Idle,
    Pending,
    Rendering,
    Displayed,
    Discarded,
    Failed,
}

#[derive(Debug)]
pub enum PreviewEvent {
    Rendering {
        generation: u64,
    },
    Displayed {
        generation: u64,
        result: EncodedResult,
    },
    /// Superseded, either before rendering or after completing late.
    Discarded {
        generation: u64,
    },
    /// The latest request failed. Stale failures are reported as `Discarded`.
    Failed {
        generation: u64,
        error: TranscodeError,
    },
}

impl PreviewEvent {
    pub fn generation(&self) -> u64 {
        match self {
            PreviewEvent::Rendering { generation }
            | PreviewEvent::Displayed { generation, .. }
            | PreviewEvent::Discarded { generation }
            | PreviewEvent::Failed { generation, .. } => *generation,
        }
    }
}

/// Produces a preview for one parameter snapshot.
pub trait PreviewRenderer: Send + Sync + 'static {
    type Params: Send + 'static;

    fn render(
        &self,
        params: Self::Params,
    ) -> impl Future<Output = Result<EncodedResult, TranscodeError>> + Send;
}

/// Renders previews of one source through a shared [`Transcoder`].
///
/// Decode and encode are CPU-bound, so each render runs on the blocking pool
/// and the controller only awaits its completion.
pub struct TranscodeRenderer<C: Codec> {
    transcoder: Arc<Transcoder<C>>,
    source: Arc<SourceImage>,
}

impl<C: Codec + Send + 'static> TranscodeRenderer<C> {
    pub fn new(transcoder: Arc<Transcoder<C>>, source: Arc<SourceImage>) -> Self {
        Self { transcoder, source }
    }
}

impl<C: Codec + Send + 'static> PreviewRenderer for TranscodeRenderer<C> {
    type Params = RenderOptions;

    fn render(
        &self,
        options: RenderOptions,
    ) -> impl Future<Output = Result<EncodedResult, TranscodeError>> + Send {
        let transcoder = Arc::clone(&self.transcoder);
        let source = Arc::clone(&self.source);
        async move {
            tokio::task::spawn_blocking(move || {
                transcoder
                    .transcode(&source, &options)
                    .map(|transcoded| transcoded.result)
            })
            .await
            .map_err(|e| TranscodeError::Task(e.to_string()))?
        }
    }
}

/// Latest known state, keyed by generation so stale tasks can't overwrite it.
#[derive(Debug)]
struct StateCell {
    generation: u64,
    state: PreviewState,
}

pub struct PreviewController<R: PreviewRenderer> {
    renderer: Arc<R>,
    counter: Arc<GenerationCounter>,
    debounce: Duration,
    events: mpsc::UnboundedSender<PreviewEvent>,
    state: Arc<Mutex<StateCell>>,
}

impl<R: PreviewRenderer> PreviewController<R> {
    pub fn new(
        renderer: Arc<R>,
        counter: Arc<GenerationCounter>,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PreviewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = StateCell {
            generation: counter.current(),
            state: PreviewState::Idle,
        };
        let controller = Self {
            renderer,
            counter,
            debounce,
            events,
            state: Arc::new(Mutex::new(state)),
        };
        (controller, rx)
    }

    pub fn counter(&self) -> &Arc<GenerationCounter> {
        &self.counter
    }

    /// State of the most recent request.
    pub fn state(&self) -> (u64, PreviewState) {
        let cell = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (cell.generation, cell.state)
    }

    /// True when the latest request has been displayed or has failed, or
    /// when nothing was ever submitted.
    pub fn is_settled(&self) -> bool {
        let (generation, state) = self.state();
        generation == self.counter.current()
            && matches!(
                state,
                PreviewState::Idle | PreviewState::Displayed | PreviewState::Failed
            )
    }

    /// Record a parameter change and schedule its render.
    ///
    /// Must be called from within a tokio runtime. Returns the generation
    /// assigned to this request.
    pub fn submit(&self, params: R::Params) -> u64 {
        let generation = self.counter.bump();
        set_state(&self.state, generation, PreviewState::Pending);
        log::debug!("preview {generation}: pending");

        let request = PreviewRequest { params, generation };
        let renderer = Arc::clone(&self.renderer);
        let counter = Arc::clone(&self.counter);
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            if !counter.is_current(request.generation) {
                log::debug!("preview {generation}: superseded before rendering");
                set_state(&state, generation, PreviewState::Discarded);
                events.send(PreviewEvent::Discarded { generation }).ok();
                return;
            }

            log::debug!("preview {generation}: rendering");
            set_state(&state, generation, PreviewState::Rendering);
            events.send(PreviewEvent::Rendering { generation }).ok();

            let outcome = renderer.render(request.params).await;

            let event = if counter.is_current(generation) {
                match outcome {
                    Ok(result) => {
                        log::debug!("preview {generation}: displayed ({} B)", result.byte_size);
                        set_state(&state, generation, PreviewState::Displayed);
                        PreviewEvent::Displayed { generation, result }
                    }
                    Err(error) => {
                        log::debug!("preview {generation}: failed: {error}");
                        set_state(&state, generation, PreviewState::Failed);
                        PreviewEvent::Failed { generation, error }
                    }
                }
            } else {
                log::debug!("preview {generation}: completed late, discarded");
                set_state(&state, generation, PreviewState::Discarded);
                PreviewEvent::Discarded { generation }
            };
            events.send(event).ok();
        });

        generation
    }
}

/// Submit every request from `inputs` and hand each event to `on_event`.
///
/// Returns once `inputs` has closed and the latest request has settled.
/// Events already queued at that point are still delivered.
pub async fn run_until_settled<R, E>(
    controller: &PreviewController<R>,
    mut inputs: mpsc::UnboundedReceiver<R::Params>,
    events: &mut mpsc::UnboundedReceiver<PreviewEvent>,
    mut on_event: impl FnMut(&PreviewEvent) -> Result<(), E>,
) -> Result<(), E>
where
    R: PreviewRenderer,
{
    let mut input_open = true;
    loop {
        if !input_open && controller.is_settled() {
            while let Ok(event) = events.try_recv() {
                on_event(&event)?;
            }
            return Ok(());
        }
        tokio::select! {
            params = inputs.recv(), if input_open => match params {
                Some(params) => {
                    controller.submit(params);
                }
                None => {
                    log::debug!("preview: input closed");
                    input_open = false;
                }
            },
            Some(event) = events.recv() => on_event(&event)?,
            else => return Ok(()),
        }
    }
}

fn set_state(cell: &Mutex<StateCell>, generation: u64, state: PreviewState) {
    let mut cell = cell.lock().unwrap_or_else(|e| e.into_inner());
    if generation >= cell.generation {
        cell.generation = generation;
        cell.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::codec::tests::MockCodec;
    use crate::transcode::{CapabilityCache, OutputFormat, Quality};
    use image::{DynamicImage, Rgba, RgbaImage};
    use tokio::time::sleep;

    /// Params are `(id, render time)`; the result's size is the id.
    #[derive(Default)]
    struct FakeRenderer {
        rendered: Mutex<Vec<u64>>,
    }

    impl FakeRenderer {
        fn rendered(&self) -> Vec<u64> {
            self.rendered.lock().unwrap().clone()
        }
    }

    impl PreviewRenderer for FakeRenderer {
        type Params = (u64, Duration);

        fn render(
            &self,
            (id, delay): (u64, Duration),
        ) -> impl Future<Output = Result<EncodedResult, TranscodeError>> + Send {
            self.rendered.lock().unwrap().push(id);
            async move {
                sleep(delay).await;
                if id == 0 {
                    return Err(TranscodeError::Decode("broken".into()));
                }
                Ok(EncodedResult {
                    bytes: vec![0; id as usize],
                    byte_size: id,
                    mime: OutputFormat::Jpeg.mime(),
                    format: OutputFormat::Jpeg,
                    quality: Some(Quality::default()),
                    substitution: None,
                })
            }
        }
    }

    fn controller(
        debounce: Duration,
    ) -> (
        Arc<FakeRenderer>,
        PreviewController<FakeRenderer>,
        mpsc::UnboundedReceiver<PreviewEvent>,
    ) {
        let renderer = Arc::new(FakeRenderer::default());
        let (controller, rx) = PreviewController::new(
            Arc::clone(&renderer),
            Arc::new(GenerationCounter::new()),
            debounce,
        );
        (renderer, controller, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PreviewEvent>) -> Vec<PreviewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn displayed(events: &[PreviewEvent]) -> Vec<(u64, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                PreviewEvent::Displayed { generation, result } => {
                    Some((*generation, result.byte_size))
                }
                _ => None,
            })
            .collect()
    }

    fn discarded(events: &[PreviewEvent]) -> Vec<u64> {
        let mut gens: Vec<u64> = events
            .iter()
            .filter(|e| matches!(e, PreviewEvent::Discarded { .. }))
            .map(PreviewEvent::generation)
            .collect();
        gens.sort();
        gens
    }

    #[test]
    fn counter_is_monotonic() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.bump(), 1);
        assert_eq!(counter.bump(), 2);
        assert!(counter.is_current(2));
        assert!(!counter.is_current(1));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_renders_once() {
        let (renderer, controller, mut rx) = controller(DEFAULT_DEBOUNCE);

        for id in 1..=5 {
            controller.submit((id * 10, Duration::from_millis(5)));
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_secs(2)).await;

        let events = drain(&mut rx);
        assert_eq!(renderer.rendered(), vec![50]);
        assert_eq!(displayed(&events), vec![(5, 50)]);
        assert_eq!(discarded(&events), vec![1, 2, 3, 4]);
        assert_eq!(controller.state(), (5, PreviewState::Displayed));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_changes_each_render() {
        let (renderer, controller, mut rx) = controller(DEFAULT_DEBOUNCE);

        controller.submit((1, Duration::from_millis(10)));
        sleep(Duration::from_millis(500)).await;
        controller.submit((2, Duration::from_millis(10)));
        sleep(Duration::from_secs(1)).await;

        let events = drain(&mut rx);
        assert_eq!(renderer.rendered(), vec![1, 2]);
        assert_eq!(displayed(&events), vec![(1, 1), (2, 2)]);
        assert!(discarded(&events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_of_older_request_is_discarded() {
        let (renderer, controller, mut rx) = controller(Duration::from_millis(10));

        // Generation 1 renders slowly; generation 2 starts later but finishes first
        controller.submit((1, Duration::from_secs(1)));
        sleep(Duration::from_millis(50)).await;
        controller.submit((2, Duration::from_millis(10)));
        sleep(Duration::from_secs(3)).await;

        let events = drain(&mut rx);
        assert_eq!(renderer.rendered(), vec![1, 2]);
        assert_eq!(displayed(&events), vec![(2, 2)]);
        assert_eq!(discarded(&events), vec![1]);
        assert_eq!(controller.state(), (2, PreviewState::Displayed));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_of_current_request_is_reported() {
        let (_, controller, mut rx) = controller(Duration::from_millis(10));

        controller.submit((0, Duration::from_millis(1)));
        sleep(Duration::from_millis(100)).await;

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(PreviewEvent::Failed {
                generation: 1,
                error: TranscodeError::Decode(_)
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_of_stale_request_is_discarded() {
        let (_, controller, mut rx) = controller(Duration::from_millis(10));

        controller.submit((0, Duration::from_millis(500)));
        sleep(Duration::from_millis(50)).await;
        controller.submit((7, Duration::from_millis(1)));
        sleep(Duration::from_secs(1)).await;

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, PreviewEvent::Failed { .. })));
        assert_eq!(displayed(&events), vec![(2, 7)]);
        assert_eq!(discarded(&events), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_is_settled() {
        let (_, controller, _rx) = controller(Duration::from_millis(10));
        assert!(controller.is_settled());

        controller.submit((0, Duration::from_millis(1)));
        assert!(!controller.is_settled());
        sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.state(), (1, PreviewState::Failed));
        assert!(controller.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn session_ends_when_input_closes_after_display() {
        let (_, controller, mut rx) = controller(Duration::from_millis(10));
        let (tx, inputs) = mpsc::unbounded_channel();
        tx.send((3, Duration::from_millis(5))).unwrap();
        // Input stays open well past the display, then closes
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            drop(tx);
        });

        let mut shown = Vec::new();
        let session = run_until_settled(&controller, inputs, &mut rx, |event| {
            if let PreviewEvent::Displayed { generation, .. } = event {
                shown.push(*generation);
            }
            Ok::<_, ()>(())
        });
        tokio::time::timeout(Duration::from_secs(10), session)
            .await
            .expect("session did not end after input closed")
            .unwrap();
        assert_eq!(shown, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_waits_for_pending_request_after_input_closes() {
        let (_, controller, mut rx) = controller(Duration::from_millis(10));
        let (tx, inputs) = mpsc::unbounded_channel();
        tx.send((1, Duration::from_millis(5))).unwrap();
        tx.send((9, Duration::from_millis(500))).unwrap();
        drop(tx);

        let mut shown = Vec::new();
        let session = run_until_settled(&controller, inputs, &mut rx, |event| {
            if let PreviewEvent::Displayed { generation, result } = event {
                shown.push((*generation, result.byte_size));
            }
            Ok::<_, ()>(())
        });
        tokio::time::timeout(Duration::from_secs(10), session)
            .await
            .expect("session did not end")
            .unwrap();
        assert_eq!(shown, vec![(2, 9)]);
        assert_eq!(controller.state(), (2, PreviewState::Displayed));
    }

    #[tokio::test]
    async fn transcode_renderer_produces_result() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255])));
        let transcoder = Transcoder::new(MockCodec::with_source(source))
            .with_capabilities(Arc::new(CapabilityCache::new()));
        let renderer = Arc::new(TranscodeRenderer::new(
            Arc::new(transcoder),
            Arc::new(SourceImage::new(vec![1, 2, 3], None)),
        ));
        let (controller, mut rx) =
            PreviewController::new(renderer, Arc::new(GenerationCounter::new()), Duration::ZERO);

        controller.submit(RenderOptions {
            width: Some(10),
            ..RenderOptions::default()
        });

        loop {
            match rx.recv().await {
                Some(PreviewEvent::Displayed { generation, result }) => {
                    assert_eq!(generation, 1);
                    assert_eq!(result.mime, "image/jpeg");
                    break;
                }
                Some(PreviewEvent::Rendering { .. }) => continue,
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
