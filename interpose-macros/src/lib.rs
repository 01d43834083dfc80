//! Interpose 过程宏
//!
//! - `#[interface]` - 把 trait 声明为可代理的接口
//! - `#[intercepted]` - 把 `impl Trait for Type` 声明为接口实现，并在方法上声明拦截处理器

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl, ItemTrait};

mod intercepted;
mod interface;
mod marshal;

/// `#[interface]` 属性宏
///
/// 为 trait 生成：
/// - 接口标记类型 `{Trait}Interface` 及其 `Interface` 实现
/// - `Proxy<M, C>` 上的 trait 实现，调用经代理分派
///
/// 参数：
/// - `name = "..."` - 接口名（默认为 trait 名）
/// - `extends(Parent, ...)` - 继承的接口，需列出全部祖先接口，它们也必须使用 `#[interface]`
///
/// 输出参数用 `#[out]` 标记，必须是 `&mut T` 且 `T: Default`。
///
/// 使用示例：
/// ```ignore
/// #[interface(extends(Named))]
/// pub trait Calculator: Named {
///     fn sum(&self, a: i32, b: i32) -> i32;
///     fn divide(&self, a: i32, b: i32, #[out] remainder: &mut i32) -> i32;
/// }
/// ```
#[proc_macro_attribute]
pub fn interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = interface::InterfaceArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemTrait);

    interface::impl_interface(args, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// `#[intercepted]` 属性宏
///
/// 为实现类型生成 `ImplementationOf<{Trait}Interface>`。方法上的
/// `#[interceptor(Handler, order = N)]` 声明拦截指令，同一方法可声明多个；
/// 顺序值默认为 0。
///
/// 实现的 trait 继承其他接口时，用 `inherits(Parent, ...)` 把父接口的绑定一并加入。
///
/// 使用示例：
/// ```ignore
/// #[intercepted(inherits(Named))]
/// impl Calculator for SimpleCalculator {
///     #[interceptor(TracingHandler, order = 10)]
///     fn sum(&self, a: i32, b: i32) -> i32 {
///         a + b
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn intercepted(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = intercepted::InterceptedArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemImpl);

    intercepted::impl_intercepted(args, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
