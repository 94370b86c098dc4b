// ============================================================================
// RENDER COALESCER: at most one render in flight, at most one queued
// ============================================================================
//
// The coalescer owns the current request and a three-state machine:
//
//   Idle ──submit──▶ Busy ──submit──▶ BusyWithPending ──submit──▶ (same)
//    ▲                 │                      │
//    └──complete───────┘                      └──complete──▶ Busy (+ new job)
//
// It never touches threads.  `submit` and `complete` must both be called from
// the same serial context (the display lane); the returned `RenderJob` is
// what the caller hands to the worker lane.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::filter::{
    FilterCatalog, FilterError, FilterParams, FilterRequest, INPUT_IMAGE_KEY, ImageRef,
    ParamValue, SanitizeAction, clamp_edit, fix_parameter_values,
};
use crate::{log_info, log_warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Busy,
    /// A render is in flight and the request changed after it was snapshotted.
    BusyWithPending,
}

/// An edit coming from an input editor.
#[derive(Clone, Debug)]
pub enum RequestUpdate {
    SelectFilter(String),
    SetParam(String, ParamValue),
    /// Merged key by key, exactly like a series of `SetParam`s.
    MergeParams(FilterParams),
}

/// A snapshot of the request for the worker lane.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub sequence: u64,
    pub request: FilterRequest,
}

/// Output of one finished render.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedImage {
    pub sequence: u64,
    pub filter: String,
    pub pixels: RgbaImage,
    pub render_time: Duration,
}

/// Message from the worker lane back to the display lane.
#[derive(Clone, Debug)]
pub struct RenderCompletion {
    pub sequence: u64,
    /// `None` when the engine produced nothing; the state machine still moves on.
    pub image: Option<RenderedImage>,
}

/// Receives finished previews on the display lane.
pub trait DisplaySink {
    fn present(&mut self, frame: RenderedImage);
}

impl DisplaySink for Vec<RenderedImage> {
    fn present(&mut self, frame: RenderedImage) {
        self.push(frame);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub dispatched: u64,
    pub completed: u64,
    pub presented: u64,
    /// Edits absorbed while a render was already in flight.
    pub coalesced: u64,
}

pub struct RenderCoalescer {
    catalog: Arc<dyn FilterCatalog>,
    default_image: ImageRef,
    state: RenderState,
    filter: Option<String>,
    params: FilterParams,
    next_sequence: u64,
    stats: CoalescerStats,
}

impl RenderCoalescer {
    /// The stored parameters start out with `default_image` as the input
    /// image so the first selected filter has something to render.
    pub fn new(catalog: Arc<dyn FilterCatalog>, default_image: ImageRef) -> Self {
        let mut params = FilterParams::new();
        params.set(INPUT_IMAGE_KEY, ParamValue::Image(default_image.clone()));
        Self {
            catalog,
            default_image,
            state: RenderState::Idle,
            filter: None,
            params,
            next_sequence: 1,
            stats: CoalescerStats::default(),
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RenderState::Idle
    }

    pub fn stats(&self) -> CoalescerStats {
        self.stats
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn catalog(&self) -> &Arc<dyn FilterCatalog> {
        &self.catalog
    }

    /// The current request, once a filter has been selected.
    pub fn request(&self) -> Option<FilterRequest> {
        self.filter.as_ref().map(|filter| FilterRequest {
            filter: filter.clone(),
            params: self.params.clone(),
        })
    }

    /// Apply an edit and decide whether a render has to start now.
    ///
    /// Returns the job to hand to the worker, or `None` when the edit was
    /// absorbed (a render is already in flight, or no filter is selected).
    /// An unknown filter name is rejected without touching any state.
    pub fn submit(&mut self, update: RequestUpdate) -> Result<Option<RenderJob>, FilterError> {
        match update {
            RequestUpdate::SelectFilter(name) => {
                self.select_filter(name)?;
            }
            RequestUpdate::SetParam(key, value) => {
                let value = self.clamp_to_schema(&key, value);
                self.params.set(key, value);
            }
            RequestUpdate::MergeParams(params) => {
                let params = params
                    .iter()
                    .map(|(key, value)| (key.to_string(), self.clamp_to_schema(key, value.clone())))
                    .collect();
                self.params.merge(params);
            }
        }
        Ok(self.request_render())
    }

    /// Edits made while a filter is selected are held to its slider maxima.
    fn clamp_to_schema(&self, key: &str, value: ParamValue) -> ParamValue {
        let Some(spec) = self
            .filter
            .as_deref()
            .and_then(|name| self.catalog.schema(name))
            .and_then(|schema| schema.input(key))
        else {
            return value;
        };
        let (value, action) = clamp_edit(spec, value);
        if let Some(action) = action {
            log_info!("edit corrected: {:?}", action);
        }
        value
    }

    fn select_filter(&mut self, name: String) -> Result<Vec<SanitizeAction>, FilterError> {
        let Some(schema) = self.catalog.schema(&name) else {
            return Err(FilterError::UnknownFilter(name));
        };
        let actions = fix_parameter_values(schema, &mut self.params, &self.default_image);
        for action in &actions {
            log_info!("sanitised for {}: {:?}", name, action);
        }
        self.filter = Some(name);
        Ok(actions)
    }

    fn request_render(&mut self) -> Option<RenderJob> {
        self.filter.as_ref()?;
        match self.state {
            RenderState::Idle => {
                self.state = RenderState::Busy;
                Some(self.snapshot())
            }
            RenderState::Busy => {
                self.state = RenderState::BusyWithPending;
                self.stats.coalesced += 1;
                None
            }
            RenderState::BusyWithPending => {
                self.stats.coalesced += 1;
                None
            }
        }
    }

    fn snapshot(&mut self) -> RenderJob {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.stats.dispatched += 1;
        RenderJob {
            sequence,
            request: FilterRequest {
                filter: self.filter.clone().unwrap_or_default(),
                params: self.params.clone(),
            },
        }
    }

    /// Handle the worker's completion: present the image (if any), then either
    /// go idle or start the pending re-render from the *current* request.
    pub fn complete<S>(&mut self, completion: RenderCompletion, sink: &mut S) -> Option<RenderJob>
    where
        S: DisplaySink + ?Sized,
    {
        if self.state == RenderState::Idle {
            log_warn!(
                "ignoring completion #{} while idle",
                completion.sequence
            );
            return None;
        }

        self.stats.completed += 1;
        if let Some(frame) = completion.image {
            self.stats.presented += 1;
            sink.present(frame);
        }

        match self.state {
            RenderState::BusyWithPending => {
                self.state = RenderState::Busy;
                Some(self.snapshot())
            }
            _ => {
                self.state = RenderState::Idle;
                None
            }
        }
    }

    /// Forget the in-flight render without a completion (the worker lane is
    /// gone).  Pending edits stay in the request.
    pub fn abandon_in_flight(&mut self) {
        if self.state != RenderState::Idle {
            log_warn!("abandoning in-flight render in state {:?}", self.state);
        }
        self.state = RenderState::Idle;
    }
}
