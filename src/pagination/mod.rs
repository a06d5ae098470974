//! Pagination module
//!
//! Supports: Cursor, Offset, Page Number, Link Header, Next URL, none
//!
//! # Overview
//!
//! A `Paginator` turns one fetched page into the cursor of the next one.
//! It never tracks progress itself; visited cursors, page counts and limits
//! live in the pagination driver.

mod strategies;
mod types;

pub use strategies::{
    parse_link_header, CursorPaginator, LinkHeaderPaginator, NextUrlPaginator, NoPaginator,
    OffsetPaginator, PageNumberPaginator,
};
pub use types::{PageCursor, PageResponse, Paginator, StopCondition};
