pub mod dispatcher;
pub mod locator;
pub mod queue;
pub mod transitions;
