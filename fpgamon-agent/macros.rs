//! Event-table and exporter macros shared by the counter banks and `serve`

/// Name-only enum, e.g. the counter banks
///
/// `name()` is the namespace object the bank lives under (`perf/<name>`).
///
/// ```
/// use fpgamon::metric_enum;
///
/// metric_enum! {
///     pub enum Bank {
///         Cache => "cache",
///         Fabric => "fabric",
///     }
/// }
///
/// assert_eq!(Bank::Fabric.name(), "fabric");
/// assert_eq!(Bank::all().len(), 2);
/// ```
#[macro_export]
macro_rules! metric_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Event table for a bank without a channel selector (fabric, VT-d)
///
/// `name()` is the attribute file, `$method()` the event code written to the
/// bank's control register.
///
/// ```
/// use fpgamon::enum_with_data;
///
/// enum_with_data! {
///     pub enum Link: u64 {
///         Pcie0Read => ("pcie0_read", 0),
///         UpiRead => ("upi_read", 4),
///     }
///     impl code -> u64
/// }
///
/// assert_eq!(Link::UpiRead.name(), "upi_read");
/// assert_eq!(Link::UpiRead.code(), 4);
/// ```
#[macro_export]
macro_rules! enum_with_data {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $data_type:ty {
            $($variant:ident => ($str:literal, $data:expr)),* $(,)?
        }
        impl $method:ident -> $return_type:ty
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn $method(&self) -> $return_type {
                match self {
                    $($name::$variant => $data,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Event table for the cache bank, where every event is counted on one channel
///
/// ```ignore
/// enum_with_selector! {
///     pub enum CacheEvent {
///         ReadHit => ("read_hit", channel::RD, cache_event::RD_HIT),
///     }
/// }
/// ```
#[macro_export]
macro_rules! enum_with_selector {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => ($str:literal, $chan:expr, $event:expr)),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            /// (channel, event code)
            pub fn selector(&self) -> (u64, u64) {
                match self {
                    $($name::$variant => ($chan, $event),)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Queue one refresh of an exporter's gauges, skipping exporters that failed to set up
///
/// ```ignore
/// let mut tasks = Vec::new();
/// spawn_collector!(tasks, &self.fme_exporter);
/// ```
#[macro_export]
macro_rules! spawn_collector {
    ($tasks:expr, $exporter:expr) => {
        if let Some(exporter) = $exporter {
            let exp = std::sync::Arc::clone(exporter);
            $tasks.push(tokio::spawn(async move {
                exp.collect().await;
            }));
        }
    };
}

/// Append an exporter's gauges to a `/metrics` response body
///
/// Encoding failures are logged; the rest of the body is still served.
#[macro_export]
macro_rules! gather_metrics {
    ($buffer:expr, $encoder:expr, $exporter:expr, $name:literal) => {
        if let Some(ref exporter) = $exporter {
            let metric_families = exporter.registry().gather();
            if let Err(e) = $encoder.encode(&metric_families, &mut $buffer) {
                tracing::error!(concat!("Failed to encode ", $name, " metrics: {}"), e);
            }
        }
    };
}
