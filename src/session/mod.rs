//! Mounted chat views and their event loops.
//!
//! Each mounted [`ChatView`](crate::view::ChatView) lives in its own tokio
//! task that owns the view and its backend channel exclusively. The
//! [`ViewStore`] hands out [`Subscription`]s to rendered transcripts and
//! unmounts a view when its last subscriber leaves.
//!
//! # Architecture
//!
//! - [`ViewHandle`]: send input to / unmount a running view
//! - [`ViewStore`]: client id → mounted view, open-once per mount
//! - [`Subscription`]: a subscriber's lease on a mounted view

mod store;
mod task;

pub use store::{Subscription, ViewStore};
pub use task::{ViewCommand, ViewHandle, mount};
