//! Canonical event names and dedup kinds.
//!
//! The collector matches on exact strings; every tracker goes through these
//! constants so a rename stays a one-line change.

/// Session boundary: a new session started.
pub const EVENT_SESSION_START: &str = "session_start";
/// Session boundary: the previous session expired.
pub const EVENT_SESSION_END: &str = "session_end";

/// A page was rendered.
pub const EVENT_PAGE_VIEW: &str = "page_view";
/// A listing detail page was viewed (dedup-guarded per session).
pub const EVENT_LISTING_VIEW: &str = "listing_view";
/// A batch of listings became visible on screen (dedup-filtered).
pub const EVENT_LISTING_IMPRESSIONS: &str = "listing_impressions";
/// Search filters were applied.
pub const EVENT_FILTER_APPLY: &str = "filter_apply";
/// A free-text search was submitted.
pub const EVENT_SEARCH_QUERY: &str = "search_query";

/// Posting funnel: attempt started.
pub const EVENT_POST_STARTED: &str = "post_started";
/// Posting funnel: form submitted.
pub const EVENT_POST_SUBMITTED: &str = "post_submitted";
/// Posting funnel: submission confirmed.
pub const EVENT_POST_SUCCESS: &str = "post_success";
/// Posting funnel: attempt abandoned before success.
pub const EVENT_POST_ABANDONED: &str = "post_abandoned";

/// Dedup kind for listing detail views.
pub const DEDUP_KIND_LISTING_VIEW: &str = "listing_view";
/// Dedup kind for listing impressions.
pub const DEDUP_KIND_LISTING_IMPRESSION: &str = "listing_impression";

/// Name of the posting funnel.
pub const FUNNEL_POST: &str = "post";
