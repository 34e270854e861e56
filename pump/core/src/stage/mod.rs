//! Operator Stages
//!
//! Each stage is a plain function from one chunk stream to another; the
//! [`Pump`](crate::Pump) methods compose them.
//!
//! Stages are pull-driven: they request the next envelope from upstream only
//! when their own downstream asks for one. `buffer` is the only stage that
//! deliberately decouples pacing.
//!
//! | Stage      | Shape | Sequence of emitted envelope          |
//! |------------|-------|---------------------------------------|
//! | `map`      | 1:1   | preserved                             |
//! | `filter`   | 1:0..1| preserved (dropped numbers skipped)   |
//! | `tap`      | 1:1   | preserved                             |
//! | `batch`    | n:1   | first item of the batch               |
//! | `bundle`   | n:1   | last consumed input                   |
//! | `buffer`   | 1:1   | preserved                             |

mod batch;
mod buffer;
mod bundle;
mod filter;
mod map;
mod tap;

pub use batch::batch;
pub use buffer::buffer;
pub use bundle::{bundle, bundle_with};
pub use filter::{filter, try_filter};
pub use map::{map, map_async, try_map};
pub use tap::{on_chunk, tap};
