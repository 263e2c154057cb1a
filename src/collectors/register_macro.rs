/// Declares the built-in collectors.
///
/// For `module => Type` pairs this expands to the module declarations, a
/// `CollectorType` enum forwarding [`Collector`] to each variant, the
/// `FACTORIES` table and `COLLECTOR_NAMES` in declaration order.
macro_rules! register_collectors {
    ($($module:ident => $kind:ident),* $(,)?) => {
        $(
            pub mod $module;
            pub use $module::$kind;
        )*

        #[derive(Clone)]
        pub enum CollectorType {
            $($kind($kind),)*
        }

        impl CollectorType {
            fn as_collector(&self) -> &dyn Collector {
                match self {
                    $(Self::$kind(inner) => inner,)*
                }
            }
        }

        impl Collector for CollectorType {
            fn name(&self) -> &'static str {
                self.as_collector().name()
            }

            fn enabled_by_default(&self) -> bool {
                self.as_collector().enabled_by_default()
            }

            fn engine(&self, ctx: &CollectorContext) -> Result<Engine> {
                self.as_collector().engine(ctx)
            }
        }

        pub const FACTORIES: &[(&str, fn() -> CollectorType)] = &[
            $((stringify!($module), || CollectorType::$kind($kind::new())),)*
        ];

        pub const COLLECTOR_NAMES: &[&str] = &[$(stringify!($module),)*];

        /// Factory lookup by collector name.
        #[must_use]
        pub fn all_factories() -> HashMap<&'static str, fn() -> CollectorType> {
            FACTORIES.iter().copied().collect()
        }
    };
}
