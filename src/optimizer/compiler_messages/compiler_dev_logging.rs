// REGION ISOLATION LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_region_isolation")]
macro_rules! region_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_region_isolation"))]
macro_rules! region_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

// ISOLATION HISTORY LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_isolation_history")]
macro_rules! history_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_isolation_history"))]
macro_rules! history_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

// Extra timer logging
#[macro_export]
#[cfg(feature = "detailed_timers")]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {
        saying::say!($msg, Green #$time.elapsed());
    };
}

#[macro_export]
#[cfg(not(feature = "detailed_timers"))]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {
        // Nothing
    };
}
