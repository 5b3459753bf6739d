//! Internal macros and codegen used by the SFU media server.
//!
//! This crate is intended for inner use only.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]
#![forbid(non_ascii_idents, unsafe_code)]

mod dispatchable;
mod enum_delegate;

use proc_macro::TokenStream;

/// Delegates function calls to enum variants field.
/// Variants are expected to have only one field.
///
/// # How to use
///
/// ```
/// use sfu_macro::enum_delegate;
///
/// #[enum_delegate(pub fn as_str(&self) -> &str)]
/// #[enum_delegate(pub fn push_str(&mut self, arg: &str))]
/// enum MyEnum {
///     Foo(String),
///     Bar(String),
/// }
///
/// let mut foo = MyEnum::Foo(String::from("foo"));
/// foo.push_str("_bar");
/// assert_eq!(foo.as_str(), "foo_bar")
/// ```
///
/// # Extended example
///
/// ```
/// use sfu_macro::enum_delegate;
///
/// struct SomeState;
/// struct AnotherState;
///
/// struct Context {
///     some_value: i32,
/// }
///
/// struct Peer<S> {
///     context: Context,
///     state: S,
/// }
///
/// impl<T> Peer<T> {
///     pub fn some_value(&self) -> i32 {
///         self.context.some_value
///     }
///
///     pub fn mutable_function(&mut self) -> i32 {
///         let old_value = self.context.some_value;
///         self.context.some_value = 1000;
///         old_value
///     }
/// }
///
/// #[enum_delegate(pub fn some_value(&self) -> i32)]
/// #[enum_delegate(pub fn mutable_function(&mut self) -> i32)]
/// enum PeerStateMachine {
///     SomeState(Peer<SomeState>),
///     AnotherState(Peer<AnotherState>),
/// }
///
/// let mut peer = PeerStateMachine::SomeState(Peer {
///     context: Context { some_value: 10 },
///     state: SomeState,
/// });
///
/// assert_eq!(peer.some_value(), 10);
/// assert_eq!(peer.mutable_function(), 10);
/// assert_eq!(peer.some_value(), 1000);
/// ```
#[allow(clippy::needless_pass_by_value)]
#[proc_macro_attribute]
pub fn enum_delegate(args: TokenStream, input: TokenStream) -> TokenStream {
    enum_delegate::derive(&args, input)
        .unwrap_or_else(|e| e.to_compile_error().into())
}

/// Generates a `*Handler` trait and a dispatching function for some event,
/// represented as an `enum`.
///
/// # How to use
///
/// ### 1. Declare an `enum` for event variants.
/// ```
/// use sfu_macro::dispatchable;
///
/// #[dispatchable]
/// enum Event {
///     Some { new_bar: i32 },
///     Another,
/// }
///
/// struct Foo {
///     bar: i32,
/// }
/// ```
///
/// ### 2. Implement the handler.
///
/// For the given `enum`, the macro generates a unique trait by appending
/// `Handler` to its name. Each trait method is the `snake_case`'d variant
/// name prefixed with `on_`.
///
/// ```
/// # use sfu_macro::dispatchable;
/// #
/// # #[dispatchable]
/// # enum Event {
/// #     Some { new_bar: i32 },
/// #     Another,
/// # }
/// #
/// # struct Foo {
/// #     bar: i32,
/// # }
/// #
/// impl EventHandler for Foo {
///     fn on_some(&mut self, new_bar: i32) {
///         self.bar = new_bar;
///     }
///
///     fn on_another(&mut self) {
///         self.bar = 2;
///     }
/// }
/// ```
///
/// ### 3. Dispatch the event.
///
/// ```
/// # use sfu_macro::dispatchable;
/// #
/// # #[dispatchable]
/// # enum Event {
/// #     Some { new_bar: i32 },
/// #     Another,
/// # }
/// #
/// # struct Foo {
/// #     bar: i32,
/// # }
/// #
/// # impl EventHandler for Foo {
/// #    fn on_some(&mut self, new_bar: i32) {
/// #        self.bar = new_bar;
/// #    }
/// #    fn on_another(&mut self) {
/// #        self.bar = 2;
/// #    }
/// # }
/// let mut foo = Foo { bar: 0 };
///
/// Event::Some { new_bar: 1 }.dispatch_with(&mut foo);
/// assert_eq!(foo.bar, 1);
///
/// Event::Another.dispatch_with(&mut foo);
/// assert_eq!(foo.bar, 2);
/// ```
///
/// Variants with a single unnamed field are dispatched with their field
/// tupled as one `data` argument; variants with no fields take none.
#[proc_macro_attribute]
pub fn dispatchable(_args: TokenStream, input: TokenStream) -> TokenStream {
    dispatchable::derive(input)
        .unwrap_or_else(|e| e.to_compile_error().into())
}
