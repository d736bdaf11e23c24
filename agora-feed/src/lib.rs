//! Client side of the post listings.
//!
//! A [`Feed`](feed::Feed) pages through a user's profile or feed via a
//! [`FeedSource`](source::FeedSource). Full post records go into a normalized
//! [`PostCache`](cache::PostCache) while the paginated
//! [`FeedCollection`](collection::FeedCollection) only keeps ids and UI flags.

pub mod cache;
pub mod collection;
pub mod feed;
pub mod sentinel;
pub mod source;
