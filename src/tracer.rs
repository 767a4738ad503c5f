//! Exposes testing, profiling and tracing capabilities.

use crate::batch::FailureResolution;
use crate::forest::ValidationError;
use crate::Key;

/// Defines the [`Tracer`] trait and implements the [`Log`] and [`Aggregate`] types.
///
/// All tracer method parameters must be [`Copy`]
/// (immutable references are [`Copy`]).
///
/// Use the `{@LOG_WITH = transformer}` syntax to transform an argument for log printing,
/// where `transformer` is an invokable that accepts the argument
/// and returns any [`fmt::Debug`](std::fmt::Debug) type.
macro_rules! define_tracer {
    (
        $(
            $(#[$meta:meta])*
            fn $name:ident(
                &self
                $(,$logged_ident:ident: $logged_ty:ty $({@LOG_WITH = $log_with:expr})?)*
                $(,)?
            );
        )*
    ) => {
        /// A tracer used for recording the events throughout the application of a batch.
        ///
        /// Can be used for profiling and testing.
        pub trait Tracer: Sync {
            $(
                $(#[$meta])*
                #[allow(unused_variables)]
                fn $name(&self, $($logged_ident: $logged_ty,)*) {}
            )*
        }

        impl Tracer for Log {
            $(
                #[allow(unused_variables)]
                fn $name(&self, $($logged_ident: $logged_ty,)*) {
                    log::log!(self.0, concat!(stringify!($name), "(", $(
                        stringify!($logged_ident),
                        " = {",
                        stringify!($logged_ident),
                        ":?}, ",
                    )* ")"), $(
                        $logged_ident = define_tracer!(@LOG_EXPR $logged_ident $(@LOG_WITH = $log_with)?),
                    )*);
                }
            )*
        }

        impl_tuple_accumulate! {
            @TYPES (T1, T2, T3, T4, T5, T6, T7, T8);
            $(
                @VARS (t1, t2, t3, t4, t5, t6, t7, t8);
                @METHOD {fn $name(&self, $($logged_ident: $logged_ty,)*);}
            )*
        }
    };

    (@LOG_EXPR $ident:ident) => { $ident };
    (@LOG_EXPR $ident:ident @LOG_WITH = $closure:expr) => { ($closure)($ident) }
}

macro_rules! impl_tuple {
    (
        @TYPES ($($ty:ident),* $(,)?);
        $(
            @VARS ($($vars:ident),* $(,)?);
            @METHOD {fn $name:ident(&self, $($arg_ident:ident: $arg_ty:ty,)*);}
        )*
    ) => {
        impl<$($ty: Tracer),*> Tracer for Aggregate<($($ty,)*)> {
            $(
                fn $name(&self, $($arg_ident: $arg_ty),*) {
                    #[allow(unused_mut, unused_variables)]
                    let mut args = ($($arg_ident,)*);

                    #[allow(dead_code)]
                    fn call_with_args(tracer: &impl Tracer, ($($arg_ident,)*): &mut ($($arg_ty,)*)) {
                        tracer.$name($(*$arg_ident,)*);
                    }

                    let Aggregate(($($vars,)*)) = self;
                    $(
                        call_with_args($vars, &mut args);
                    )*
                }
            )*
        }
    };
}

macro_rules! impl_tuple_accumulate {
    (@TYPES (); $(@VARS (); @METHOD {$($body:tt)*})*) => {
        impl_tuple! {
            @TYPES ();
            $(
                @VARS ();
                @METHOD {$($body)*}
            )*
        }
    };
    (
        @TYPES ($first_ty:ident $(, $rest_ty:ident)* $(,)?);
        $(
            @VARS ($first_var:ident $(, $rest_var:ident)* $(,)?);
            @METHOD {$($body:tt)*}
        )*
    ) => {
        impl_tuple! {
            @TYPES ($first_ty $(, $rest_ty)* );
            $(
                @VARS ($first_var $(, $rest_var)*);
                @METHOD {$($body)*}
            )*
        }

        impl_tuple_accumulate! {
            @TYPES ($($rest_ty),*);
            $(
                @VARS ($($rest_var),*);
                @METHOD {$($body)*}
            )*
        }
    };
}

define_tracer! {
    /// A batch starts applying.
    fn start_batch(&self, deleted: usize, reparented: usize, resync: usize, changed: usize);

    /// A batch has been applied.
    fn end_batch(&self, removed: usize, reconvert: usize);

    /// Nodes were removed from the forest.
    fn remove_nodes(&self, keys: &[Key]);

    /// A failed reparent was checked against the authority.
    fn resolve_failed_reparent(&self, key: Key, resolution: FailureResolution);

    /// A subtree was rebuilt from the authority.
    fn resync_subtree(&self, root: Key, inserted: usize);

    /// A resync found a node that the forest did not hold before.
    fn discover_node(&self, key: Key);

    /// Debug validation found a structural error.
    fn validation_error(&self, error: &ValidationError {@LOG_WITH = ToString::to_string});
}

/// An empty tracer.
pub struct Noop;

impl Tracer for Noop {}

/// Groups multiple tracers into a tuple and dispatches each call to them in serial.
pub struct Aggregate<T>(
    /// A tuple of child tracers to execute in serial.
    pub T,
);

/// A tracer that logs all events.
pub struct Log(
    /// The log level to log events with.
    pub log::Level,
);
