/// Lets a macro define another macro that needs its own `$` metavariables.
#[macro_export]
macro_rules! with_dollar_sign {
    ($($body:tt)*) => {
        macro_rules! __with_dollar_sign { $($body)* }
        __with_dollar_sign!($);
    }
}

/// Emits a log record with the given level under the component target.
#[macro_export]
macro_rules! ci_log {
    ($level:ident | $target:literal | $($arg:tt)+) => {
        log::$level!(target: $target, $($arg)+)
    };
}

/// Declares module local `trace!`, `debug!`, `info!`, `warn!` and `error!` macros
/// that log under `$target`.
///
/// The calling module needs `ci_log` and `with_dollar_sign` in scope:
///
/// ```ignore
/// use certinjector_macros::{ci_log, logger, with_dollar_sign};
///
/// logger!("Reconciler");
///
/// fn run() {
///     info!("Starting pass {}", 1);
/// }
/// ```
#[macro_export]
macro_rules! logger {
    ($target:literal) => {
        with_dollar_sign! {
            ($d:tt) => {
                #[allow(unused_macros)]
                macro_rules! trace {
                    ($d($d arg:tt)+) => { ci_log!(trace | $target | $d($d arg)+) };
                }
                #[allow(unused_macros)]
                macro_rules! debug {
                    ($d($d arg:tt)+) => { ci_log!(debug | $target | $d($d arg)+) };
                }
                #[allow(unused_macros)]
                macro_rules! info {
                    ($d($d arg:tt)+) => { ci_log!(info | $target | $d($d arg)+) };
                }
                #[allow(unused_macros)]
                macro_rules! warn {
                    ($d($d arg:tt)+) => { ci_log!(warn | $target | $d($d arg)+) };
                }
                #[allow(unused_macros)]
                macro_rules! error {
                    ($d($d arg:tt)+) => { ci_log!(error | $target | $d($d arg)+) };
                }
            }
        }
    };
}
