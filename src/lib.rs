//! `geodataset`: discovery, ordering and parallel dispatch over
//! time-partitioned file collections addressed by a path template.
//!
//! See each module's doc comment for the component it implements;
//! `dataset::Dataset` is the user-facing facade tying them together.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod fileinfo;
pub mod handler;
pub mod interval;
pub mod template;
pub mod time;
