//! # TuneFlow Tracker Library (tuneflow-tracker)
//!
//! Turns periodic "currently playing" snapshots into discrete playback
//! events and delivers them to hot/cold ingestion paths.
//!
//! **Pipeline:** upstream poll → [`snapshot::normalize`] →
//! [`deriver::PlaybackEventDeriver`] → [`policy::PathPolicy`] →
//! [`router::EventRouter`] → [`publish::Publisher`]
//!
//! **Concurrency:** one [`poller::SessionPoller`] task per user, owned by the
//! [`supervisor::Supervisor`]; session state is never shared.
//!
//! **Observation:** pollers broadcast [`tuneflow_common::events::TrackerEvent`]
//! notifications on the [`tuneflow_common::events::EventBus`] passed to the
//! supervisor. The binary does not subscribe, since every notification is
//! also logged; embedders and tests subscribe to watch sessions live.
//! Emission is lossy and never blocks a poller.

pub mod deriver;
pub mod error;
pub mod policy;
pub mod poller;
pub mod publish;
pub mod router;
pub mod snapshot;
pub mod supervisor;
pub mod upstream;

pub use error::{Error, Result};
