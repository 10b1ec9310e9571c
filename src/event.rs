/// Payload carried through a chain.
///
/// Every stage may need to buffer or fan a payload out to several children, so
/// payloads are cloned rather than borrowed across stage boundaries. The
/// payload-less variant of a chain simply uses `()`.
pub trait Event: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Event for T {}
