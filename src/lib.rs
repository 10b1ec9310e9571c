//! Composable in-process event pipelines.
//!
//! A [`Source`] feeds a chain of [`Node`]s, each running one [`Stage`]:
//! filter, throttle, debounce, dispatch, catch, until, or your own. Chains come
//! in two flavors selected by a type parameter, [`Direct`] (every stage runs on
//! the raising thread) and [`Awaited`] (the chain is one awaited continuation),
//! and every stage works under both.
//!
//! ```no_run
//! use evflow::{Dispose, Subject};
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() {
//! let clicks = Subject::<u32>::new();
//! let chain = clicks
//!     .observe()
//!     .filter(|id| *id != 0)
//!     .throttle(Duration::from_millis(100))
//!     .on(|id| {
//!         println!("clicked {id}");
//!         Ok(())
//!     });
//!
//! clicks.emit(7).unwrap();
//! chain.dispose();
//! # }
//! ```

mod combine;
mod dispatcher;
mod emit;
mod error;
mod event;
mod lifecycle;
mod mode;
mod node;
mod signal;
mod source;
mod stage;
mod timer;

pub use combine::{Coercion, Provider};
pub use dispatcher::{Action, Dispatcher, OnError, QueueDispatcher, TokioDispatcher};
pub use emit::Emit;
pub use error::{Error, Result};
pub use event::Event;
pub use lifecycle::{Dispose, Lifecycle, ListenerKey};
pub use mode::{AsyncCallback, Awaited, Callback, Direct, Mode};
pub use node::{AsyncObserver, Node, Observer};
pub use signal::Subscription;
pub use source::{AsyncSubject, Source, Subject, Upstream};
pub use stage::{
    DebounceOptions, DispatchOptions, Downstream, Pass, Propagation, Stage, ThrottleOptions,
};
pub use timer::Timer;
