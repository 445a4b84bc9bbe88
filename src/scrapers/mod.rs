//! Score portal scraping.
//!
//! Collection runs in two layers:
//!
//! 1. **Extraction** ([`extract`]): one rendered detail page in, one
//!    [`RoundRecord`](crate::models::RoundRecord) out.
//! 2. **Pagination** ([`paginate`]): walks detail pages in order, applies the
//!    year filter and decides when the history is exhausted.
//!
//! Both layers are browser-agnostic; the HTML comes from a
//! [`PageFetcher`](crate::browser::PageFetcher).

pub mod extract;
pub mod paginate;
