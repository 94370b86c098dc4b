// End-to-end preview sessions driven through the public API with an engine
// whose renders block until the test releases them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use filterscope::filter::{
    Filter, FilterCatalog, FilterInputs, FilterRequest, FilterSchema, ImageRef, ParamSpec,
    ParamValue,
};
use filterscope::preview::{LatestFrame, PreviewSession, RenderCoalescer, RenderedImage};
use filterscope::render::RenderEngine;
use image::{Rgba, RgbaImage};

const WAIT: Duration = Duration::from_secs(10);

struct Probe {
    schema: FilterSchema,
}

impl Filter for Probe {
    fn schema(&self) -> &FilterSchema {
        &self.schema
    }

    fn apply(&self, inputs: &FilterInputs<'_>) -> Option<RgbaImage> {
        let x = inputs.scalar("x");
        Some(RgbaImage::from_pixel(1, 1, Rgba([x as u8, 0, 0, 255])))
    }
}

struct ProbeCatalog {
    probe: Probe,
}

impl ProbeCatalog {
    fn new() -> Self {
        Self {
            probe: Probe {
                schema: FilterSchema {
                    name: "Probe".into(),
                    display_name: "Probe".into(),
                    categories: vec!["Test".into()],
                    inputs: vec![ParamSpec::scalar("x", "X", 0.0, 0.0, 10.0)],
                },
            },
        }
    }
}

impl FilterCatalog for ProbeCatalog {
    fn names(&self) -> Vec<&str> {
        vec!["Probe"]
    }

    fn filter(&self, name: &str) -> Option<&dyn Filter> {
        (name == "Probe").then_some(&self.probe as &dyn Filter)
    }
}

/// Engine whose renders each wait for one token on the gate.
struct GatedEngine {
    gate: Mutex<Receiver<()>>,
    started: Mutex<Sender<f32>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RenderEngine for GatedEngine {
    fn render(&self, request: &FilterRequest) -> Option<RgbaImage> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let x = request
            .params
            .get("x")
            .and_then(ParamValue::as_scalar)
            .unwrap_or(-1.0);
        let _ = self.started.lock().unwrap().send(x);
        let _ = self.gate.lock().unwrap().recv_timeout(WAIT);

        self.active.fetch_sub(1, Ordering::SeqCst);
        match request.filter.as_str() {
            "Probe" if x >= 0.0 => Some(RgbaImage::from_pixel(2, 2, Rgba([x as u8, 0, 0, 255]))),
            _ => None,
        }
    }
}

struct Harness {
    release: Sender<()>,
    started: Receiver<f32>,
    engine: Arc<GatedEngine>,
}

impl Harness {
    fn new() -> Self {
        let (release, gate) = mpsc::channel();
        let (started_tx, started) = mpsc::channel();
        let engine = Arc::new(GatedEngine {
            gate: Mutex::new(gate),
            started: Mutex::new(started_tx),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        Self {
            release,
            started,
            engine,
        }
    }

    fn session<S: filterscope::preview::DisplaySink>(&self, sink: S) -> PreviewSession<S> {
        let catalog: Arc<dyn FilterCatalog> = Arc::new(ProbeCatalog::new());
        let blank = ImageRef::new("blank", RgbaImage::new(2, 2));
        let coalescer = RenderCoalescer::new(catalog, blank);
        PreviewSession::new(coalescer, self.engine.clone(), sink).unwrap()
    }

    fn next_started(&self) -> f32 {
        self.started.recv_timeout(WAIT).expect("render did not start")
    }

    fn release_one(&self) {
        self.release.send(()).unwrap();
    }
}

#[test]
fn edits_during_a_render_collapse_into_one_rerender_of_the_latest_values() {
    let h = Harness::new();
    let session = h.session(Vec::<RenderedImage>::new());
    let editor = session.editor();
    let lane = session.spawn().unwrap();

    editor.set_param("x", ParamValue::Scalar(1.0));
    editor.select_filter("Probe");
    assert_eq!(h.next_started(), 1.0);

    // Both edits reach the display lane before the first completion does.
    editor.set_param("x", ParamValue::Scalar(2.0));
    editor.set_param("x", ParamValue::Scalar(3.0));
    h.release_one();

    assert_eq!(h.next_started(), 3.0);
    editor.shutdown();
    h.release_one();

    let frames = lane.join().unwrap();
    let shown: Vec<u8> = frames.iter().map(|f| f.pixels.get_pixel(0, 0)[0]).collect();
    assert_eq!(shown, vec![1, 3]);
    assert!(frames.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(h.engine.max_active.load(Ordering::SeqCst), 1);
    assert!(h.started.try_recv().is_err(), "no third render");
}

#[test]
fn out_of_range_value_is_clamped_when_the_filter_is_selected() {
    let h = Harness::new();
    let session = h.session(Vec::<RenderedImage>::new());
    let editor = session.editor();
    let lane = session.spawn().unwrap();

    editor.set_param("x", ParamValue::Scalar(200.0));
    editor.select_filter("Probe");
    assert_eq!(h.next_started(), 10.0);
    editor.shutdown();
    h.release_one();

    let frames = lane.join().unwrap();
    assert_eq!(frames.len(), 1);
}

#[test]
fn empty_output_keeps_previous_frame_and_session_recovers() {
    let h = Harness::new();
    let observer = LatestFrame::new();
    let session = h.session(observer.clone());
    let editor = session.editor();
    let lane = session.spawn().unwrap();

    editor.set_param("x", ParamValue::Scalar(4.0));
    editor.select_filter("Probe");
    assert_eq!(h.next_started(), 4.0);
    h.release_one();

    // Negative values make the engine return nothing.
    editor.set_param("x", ParamValue::Scalar(-5.0));
    assert_eq!(h.next_started(), -5.0);
    h.release_one();

    editor.set_param("x", ParamValue::Scalar(6.0));
    assert_eq!(h.next_started(), 6.0);
    editor.shutdown();
    h.release_one();

    lane.join().unwrap();
    assert_eq!(observer.presented(), 2);
    let last = observer.frame().unwrap();
    assert_eq!(last.pixels.get_pixel(0, 0)[0], 6);
}

#[test]
fn unknown_filter_starts_nothing() {
    let h = Harness::new();
    let mut session = h.session(Vec::<RenderedImage>::new());
    let editor = session.editor();

    editor.select_filter("Nope");
    session.run_until_idle();

    assert_eq!(session.rejected(), 1);
    assert!(session.coalescer().is_idle());
    assert!(session.sink().is_empty());
    assert!(h.started.try_recv().is_err());
}
