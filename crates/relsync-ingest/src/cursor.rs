//! Watermark-driven pagination
//!
//! A stored watermark is an opaque string to everything except this module.
//! It encodes a [`ResumePosition`]: a continuation token, optionally paired
//! with a minimum boundary timestamp, comma-joined:
//!
//! ```text
//! 42                          token only
//! 42,2023-01-01T00:00:00Z     token and boundary
//! ```
//!
//! [`CursorEngine`] fetches pages strictly one after another. After every
//! page it derives the next position with [`derive_next`] and asks
//! [`evaluate`] whether to keep going. Only the position at the end of a run
//! is ever persisted.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::source::{Endpoint, Page, PageQuery, SourceClient};

/// Boundary renderings written by earlier collectors, tried after RFC 3339
const LEGACY_BOUNDARY_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S"];

/// How a watermark string is laid out for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCodec {
    /// `"<token>"`
    TokenOnly,
    /// `"<token>,<boundary>"`; the boundary advances from `field` of the
    /// last record on a page
    TokenAndBoundary { field: &'static str },
}

/// Where the next page request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePosition {
    pub continuation_token: i64,
    pub min_boundary: Option<DateTime<Utc>>,
}

impl ResumePosition {
    /// A position with only a continuation token
    pub fn token(continuation_token: i64) -> Self {
        Self {
            continuation_token,
            min_boundary: None,
        }
    }

    pub fn with_boundary(continuation_token: i64, min_boundary: DateTime<Utc>) -> Self {
        Self {
            continuation_token,
            min_boundary: Some(min_boundary),
        }
    }
}

impl CursorCodec {
    /// Record field the boundary is taken from, if one is tracked
    pub fn boundary_field(&self) -> Option<&'static str> {
        match self {
            CursorCodec::TokenOnly => None,
            CursorCodec::TokenAndBoundary { field } => Some(field),
        }
    }

    /// The "start from the beginning" position
    pub fn initial(&self) -> ResumePosition {
        match self {
            CursorCodec::TokenOnly => ResumePosition::token(0),
            CursorCodec::TokenAndBoundary { .. } => {
                ResumePosition::with_boundary(0, DateTime::<Utc>::UNIX_EPOCH)
            },
        }
    }

    /// Decode a stored watermark.
    ///
    /// Never fails: an absent, empty or malformed watermark resets the whole
    /// position to [`CursorCodec::initial`].
    pub fn parse(&self, raw: Option<&str>) -> ResumePosition {
        let raw = match raw.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => {
                debug!("No watermark recorded, starting from the beginning");
                return self.initial();
            },
        };

        match self.try_parse(raw) {
            Some(position) => position,
            None => {
                warn!(watermark = raw, "Malformed watermark, starting from the beginning");
                self.initial()
            },
        }
    }

    fn try_parse(&self, raw: &str) -> Option<ResumePosition> {
        match self {
            CursorCodec::TokenOnly => raw.parse().ok().map(ResumePosition::token),
            CursorCodec::TokenAndBoundary { .. } => {
                let (token, boundary) = raw.split_once(',')?;
                let token = token.trim().parse().ok()?;
                let boundary = parse_boundary(boundary.trim())?;
                Some(ResumePosition::with_boundary(token, boundary))
            },
        }
    }

    /// Encode a position for the watermark store
    pub fn format(&self, position: &ResumePosition) -> String {
        match self {
            CursorCodec::TokenOnly => position.continuation_token.to_string(),
            CursorCodec::TokenAndBoundary { .. } => {
                let boundary = position.min_boundary.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                format!(
                    "{},{}",
                    position.continuation_token,
                    boundary.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                )
            },
        }
    }
}

fn parse_boundary(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    LEGACY_BOUNDARY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Derive the position for the next request from the page just fetched.
///
/// - non-empty page, no server hint: advance past the last record locally and
///   move the boundary to that record's boundary field
/// - server hint that names the page's last record: step past it
/// - any other server hint: take it verbatim
///
/// An empty page, or a token that would overflow, leaves the position where
/// it was.
pub fn derive_next(current: &ResumePosition, page: &Page, codec: &CursorCodec) -> ResumePosition {
    let Some(last) = page.last() else {
        return *current;
    };

    let step = if page.continuation_hint == 0 || last.id == page.continuation_hint {
        last.id.checked_add(1)
    } else {
        Some(page.continuation_hint)
    };
    let Some(token) = step else {
        warn!(record = last.id, "Continuation token overflow, holding position");
        return *current;
    };

    let mut next = *current;
    next.continuation_token = token;
    if page.continuation_hint == 0 {
        if let Some(field) = codec.boundary_field() {
            match last.timestamp(field) {
                Some(ts) => next.min_boundary = Some(ts),
                None => debug!(record = last.id, field, "Last record has no boundary timestamp"),
            }
        }
    }
    next
}

/// Why a run stopped paginating without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned no records
    EmptyPage,
    /// The derived continuation token was zero
    NoContinuation,
    /// More records than the entity's cap were fetched
    CapReached,
    /// A non-empty page did not move the position
    Stalled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::EmptyPage => "empty page",
            StopReason::NoContinuation => "no continuation",
            StopReason::CapReached => "record cap reached",
            StopReason::Stalled => "position stalled",
        };
        f.write_str(text)
    }
}

/// Result of the termination predicate
#[derive(Debug)]
pub enum LoopOutcome {
    Continue,
    StopClean(StopReason),
    StopError(IngestError),
}

/// Decide whether to fetch another page.
///
/// `fetched` is the number of records fetched in this run including `page`.
pub fn evaluate(
    page: &Page,
    previous: &ResumePosition,
    next: &ResumePosition,
    fetched: usize,
    cap: usize,
) -> LoopOutcome {
    if page.is_empty() {
        return LoopOutcome::StopClean(StopReason::EmptyPage);
    }
    if next.continuation_token == 0 {
        return LoopOutcome::StopClean(StopReason::NoContinuation);
    }
    if page.continuation_hint == 0 && next.continuation_token < previous.continuation_token {
        return LoopOutcome::StopError(IngestError::decode(format!(
            "continuation moved backwards from {} to {}; page is not in ascending id order",
            previous.continuation_token, next.continuation_token
        )));
    }
    if fetched > cap {
        return LoopOutcome::StopClean(StopReason::CapReached);
    }
    if next == previous {
        return LoopOutcome::StopClean(StopReason::Stalled);
    }
    LoopOutcome::Continue
}

/// Pull-style pager over one entity's source endpoint
pub struct CursorEngine {
    source: Arc<dyn SourceClient>,
    endpoint: Endpoint,
    codec: CursorCodec,
    page_size: usize,
    cap: usize,
    position: ResumePosition,
    fetched: usize,
    pages: usize,
    stopped: Option<StopReason>,
    failed: bool,
}

impl CursorEngine {
    pub fn new(
        source: Arc<dyn SourceClient>,
        endpoint: Endpoint,
        codec: CursorCodec,
        start: ResumePosition,
        page_size: usize,
        cap: usize,
    ) -> Self {
        Self {
            source,
            endpoint,
            codec,
            page_size,
            cap,
            position: start,
            fetched: 0,
            pages: 0,
            stopped: None,
            failed: false,
        }
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the run has stopped cleanly. A fetch or
    /// ordering error stops the engine and leaves [`position`](Self::position)
    /// at the last good value.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.stopped.is_some() || self.failed {
            return Ok(None);
        }

        let query = PageQuery {
            endpoint: self.endpoint,
            continuation_token: self.position.continuation_token,
            min_boundary: self.position.min_boundary,
            page_size: self.page_size,
        };
        let page = match self.source.fetch_page(&query).await {
            Ok(page) => page,
            Err(e) => {
                self.failed = true;
                return Err(e);
            },
        };
        self.pages += 1;
        self.fetched += page.len();

        let next = derive_next(&self.position, &page, &self.codec);
        debug!(
            endpoint = self.endpoint.path(),
            token = query.continuation_token,
            records = page.len(),
            hint = page.continuation_hint,
            next_token = next.continuation_token,
            "Fetched page"
        );

        match evaluate(&page, &self.position, &next, self.fetched, self.cap) {
            LoopOutcome::Continue => {
                self.position = next;
                Ok(Some(page))
            },
            LoopOutcome::StopClean(StopReason::EmptyPage) => {
                self.stopped = Some(StopReason::EmptyPage);
                Ok(None)
            },
            LoopOutcome::StopClean(reason @ (StopReason::NoContinuation | StopReason::Stalled)) => {
                self.stopped = Some(reason);
                Ok(Some(page))
            },
            LoopOutcome::StopClean(StopReason::CapReached) => {
                self.position = next;
                self.stopped = Some(StopReason::CapReached);
                Ok(Some(page))
            },
            LoopOutcome::StopError(e) => {
                self.failed = true;
                Err(e)
            },
        }
    }

    /// Candidate watermark: the last successfully derived position
    pub fn position(&self) -> &ResumePosition {
        &self.position
    }

    /// The position encoded for the watermark store
    pub fn watermark(&self) -> String {
        self.codec.format(&self.position)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    pub fn records_fetched(&self) -> usize {
        self.fetched
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}
