//! Observability hooks injected into the router.

use std::fmt;

/// Receives the router's diagnostic events.
pub trait Observer {
    fn info(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
    fn debug(&self, args: fmt::Arguments<'_>);
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

const TARGET: &str = "parley::router";

impl Observer for LogObserver {
    fn info(&self, args: fmt::Arguments<'_>) {
        log::info!(target: TARGET, "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        log::error!(target: TARGET, "{}", args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        log::debug!(target: TARGET, "{}", args);
    }
}

impl<T: Observer + ?Sized> Observer for std::sync::Arc<T> {
    fn info(&self, args: fmt::Arguments<'_>) {
        (**self).info(args)
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        (**self).error(args)
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        (**self).debug(args)
    }
}
