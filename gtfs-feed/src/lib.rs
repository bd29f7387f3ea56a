/*! In-memory model of a [GTFS](https://gtfs.org/) schedule feed, with CSV
reading and writing.

A feed is a collection of CSV files (often bundled as a zip file). Each file
represents one table of entities (stops, routes, trips, …) related through
string identifiers.

## Design decisions

### Raw records and the linked feed

The types in [objects] stay as close as possible to the CSV representation;
[FeedReader] deserializes them and links them into a [Feed], where stop
times live inside their [Trip], calendars and calendar dates are unified
into [Service] recurrence patterns, and fare rules live inside their
[FareAttribute]. Invalid references are either an error or dropped,
depending on the reader options.

### String-id references

Tables own their entities; relations between entities are plain string ids.
Consumers that delete or re-key entities only ever touch the owning table
plus the referencing id fields.

### Enumerations

Integer-coded fields use Rust enums ([LocationType], [PickupDropOffType],
…) that keep unknown codes as `Unknown(i32)` so they can round-trip. The
one exception is the route type, which is kept as its raw extended `i16`
code; [BaseRouteType::from_extended] maps it onto the twelve base modes.

### Additional columns

Non-standard columns are carried through verbatim, keyed by column name and
entity id (see [ExtraFields]), so that a read-write cycle preserves them.
*/

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate serde_derive;

mod enums;
pub mod error;
mod feed;
mod objects;
mod reader;
mod serde_helpers;
mod writer;

pub use error::Error;
pub use feed::*;
pub use objects::*;
pub use reader::FeedReader;
pub use serde_helpers::{format_color, format_date, format_time, parse_color, parse_date, parse_time};
pub use writer::FeedWriter;
