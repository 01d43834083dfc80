//! 方法签名分析与参数编组代码生成
//!
//! `#[interface]` 与 `#[intercepted]` 共用：两边生成的签名描述必须一致，
//! 否则构建代理类型时会因签名不符而失败。

use proc_macro2::{Delimiter, Ident, TokenStream, TokenTree};
use quote::{format_ident, quote, ToTokens};
use syn::parse::ParseStream;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Attribute, FnArg, GenericParam, Generics, Pat, Path, ReturnType, Signature, Token, Type,
};

/// 参数传递方式
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Value,
    Ref,
    Out,
}

impl Mode {
    fn tokens(self) -> TokenStream {
        match self {
            Mode::Value => quote!(::interpose::Passing::Value),
            Mode::Ref => quote!(::interpose::Passing::Ref),
            Mode::Out => quote!(::interpose::Passing::Out),
        }
    }
}

pub(crate) struct Param {
    pub name: String,
    /// 按引用与输出参数为 `&mut T` 中的 `T`
    pub ty: Type,
    pub mode: Mode,
}

pub(crate) struct MethodInfo {
    pub ident: Ident,
    pub generics: Vec<Ident>,
    pub params: Vec<Param>,
    pub output: Option<Type>,
}

impl MethodInfo {
    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }
}

/// 分析方法签名，只接受 `&self` 方法
pub(crate) fn analyze(sig: &Signature) -> syn::Result<MethodInfo> {
    if let Some(token) = &sig.asyncness {
        return Err(syn::Error::new(token.span(), "async methods cannot be intercepted"));
    }
    if let Some(token) = &sig.unsafety {
        return Err(syn::Error::new(token.span(), "unsafe methods cannot be intercepted"));
    }
    if let Some(variadic) = &sig.variadic {
        return Err(syn::Error::new(variadic.span(), "variadic methods cannot be intercepted"));
    }

    let receiver_ok = sig.receiver().is_some_and(|receiver| {
        receiver.reference.is_some() && receiver.mutability.is_none() && receiver.colon_token.is_none()
    });
    if !receiver_ok {
        return Err(syn::Error::new(
            sig.span(),
            "intercepted methods must take `&self`",
        ));
    }

    let mut generics = Vec::new();
    for param in &sig.generics.params {
        match param {
            GenericParam::Type(ty) => generics.push(ty.ident.clone()),
            GenericParam::Lifetime(lifetime) => {
                return Err(syn::Error::new(
                    lifetime.span(),
                    "lifetime parameters are not supported on intercepted methods",
                ))
            }
            GenericParam::Const(constant) => {
                return Err(syn::Error::new(
                    constant.span(),
                    "const parameters are not supported on intercepted methods",
                ))
            }
        }
    }

    let mut params = Vec::new();
    for input in sig.inputs.iter().skip(1) {
        let FnArg::Typed(typed) = input else {
            continue;
        };
        let name = match &*typed.pat {
            Pat::Ident(pat) => pat.ident.to_string(),
            Pat::Wild(_) => format!("arg{}", params.len()),
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "parameters of intercepted methods must be plain identifiers",
                ))
            }
        };
        let is_out = has_out_attr(&typed.attrs);
        let (ty, mode) = match &*typed.ty {
            Type::Reference(reference) if reference.mutability.is_some() => {
                let mode = if is_out { Mode::Out } else { Mode::Ref };
                ((*reference.elem).clone(), mode)
            }
            Type::Reference(reference) => {
                return Err(syn::Error::new(
                    reference.span(),
                    "shared references cannot be marshalled, pass by value or `&mut`",
                ))
            }
            Type::ImplTrait(impl_trait) => {
                return Err(syn::Error::new(
                    impl_trait.span(),
                    "`impl Trait` parameters are not supported, use a named generic parameter",
                ))
            }
            other if is_out => {
                return Err(syn::Error::new(
                    other.span(),
                    "#[out] parameters must be `&mut T`",
                ))
            }
            other => (other.clone(), Mode::Value),
        };
        params.push(Param { name, ty, mode });
    }

    let output = match &sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => match &**ty {
            Type::Tuple(tuple) if tuple.elems.is_empty() => None,
            ty => Some(ty.clone()),
        },
    };

    Ok(MethodInfo {
        ident: sig.ident.clone(),
        generics,
        params,
        output,
    })
}

fn has_out_attr(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident("out"))
}

/// 去掉参数上的 `#[out]` 标记
pub(crate) fn strip_out_attrs(sig: &mut Signature) {
    for input in sig.inputs.iter_mut() {
        if let FnArg::Typed(typed) = input {
            typed.attrs.retain(|attr| !attr.path().is_ident("out"));
        }
    }
}

/// 生成 `MethodSignature` 的构建表达式
pub(crate) fn signature_tokens(info: &MethodInfo) -> TokenStream {
    let name = info.ident.to_string();
    let generics = info.generics.iter().map(ToString::to_string);
    let params = info.params.iter().map(|param| {
        let name = &param.name;
        let ty = type_ref(&param.ty, &info.generics);
        let passing = param.mode.tokens();
        quote!(.with_param(#name, #ty, #passing))
    });
    let returns = info.output.as_ref().map(|ty| {
        let ty = type_ref(ty, &info.generics);
        quote!(.with_return(#ty))
    });
    quote! {
        ::interpose::MethodSignature::new(#name)
            #(.generic(#generics))*
            #(#params)*
            #returns
    }
}

fn type_ref(ty: &Type, generics: &[Ident]) -> TokenStream {
    let tokens = ty.to_token_stream();
    if mentions(&tokens, generics) {
        let text = open_text(tokens, generics);
        quote!(::interpose::TypeRef::open(#text))
    } else {
        quote!(::interpose::TypeRef::of::<#ty>())
    }
}

fn mentions(tokens: &TokenStream, generics: &[Ident]) -> bool {
    tokens.clone().into_iter().any(|tree| match tree {
        TokenTree::Ident(ident) => generics.contains(&ident),
        TokenTree::Group(group) => mentions(&group.stream(), generics),
        _ => false,
    })
}

/// 开放类型的规范文本：方法泛型参数按位置写作 `$0`、`$1`，
/// 于是实现方重命名泛型参数不影响签名比较
fn open_text(tokens: TokenStream, generics: &[Ident]) -> String {
    let mut text = String::new();
    let mut after_word = false;
    for tree in tokens {
        let (piece, is_word) = match tree {
            TokenTree::Ident(ident) => match generics.iter().position(|g| *g == ident) {
                Some(index) => (format!("${}", index), true),
                None => (ident.to_string(), true),
            },
            TokenTree::Literal(literal) => (literal.to_string(), true),
            TokenTree::Punct(punct) => (punct.as_char().to_string(), false),
            TokenTree::Group(group) => {
                let inner = open_text(group.stream(), generics);
                let piece = match group.delimiter() {
                    Delimiter::Parenthesis => format!("({})", inner),
                    Delimiter::Bracket => format!("[{}]", inner),
                    Delimiter::Brace => format!("{{{}}}", inner),
                    Delimiter::None => inner,
                };
                (piece, false)
            }
        };
        if after_word && is_word {
            text.push(' ');
        }
        text.push_str(&piece);
        after_word = is_word;
    }
    text
}

/// 终端调用体：从 `__slots` 读取实参，以 `__target` 为接收者调用 `call`，
/// 写回按引用与输出参数，结果为 `ProxyResult<Option<Value>>`
pub(crate) fn call_body(info: &MethodInfo, call: &TokenStream) -> TokenStream {
    let mut loads = Vec::new();
    let mut call_args = Vec::new();
    let mut stores = Vec::new();
    for (index, param) in info.params.iter().enumerate() {
        let var = format_ident!("__a{}", index);
        let ty = &param.ty;
        match param.mode {
            Mode::Value => {
                loads.push(quote!(let #var: #ty = __slots.take::<#ty>(#index)?;));
                call_args.push(quote!(#var));
            }
            Mode::Ref => {
                loads.push(quote!(let mut #var: #ty = __slots.take::<#ty>(#index)?;));
                call_args.push(quote!(&mut #var));
                stores.push(quote!(__slots.set::<#ty>(#index, #var)?;));
            }
            Mode::Out => {
                loads.push(quote!(
                    let mut #var: #ty = ::interpose::__private::out_value::<#ty>(__slots, #index)?;
                ));
                call_args.push(quote!(&mut #var));
                stores.push(quote!(__slots.set::<#ty>(#index, #var)?;));
            }
        }
    }

    if info.output.is_some() {
        quote! {
            #(#loads)*
            let __ret = #call(__target #(, #call_args)*);
            #(#stores)*
            ::std::result::Result::Ok(::std::option::Option::Some(::interpose::Value::opaque(__ret)))
        }
    } else {
        quote! {
            #(#loads)*
            #call(__target #(, #call_args)*);
            #(#stores)*
            ::std::result::Result::Ok(::std::option::Option::None)
        }
    }
}

/// `a::Calculator<T>` 对应的标记类型 `a::CalculatorInterface<T>`
pub(crate) fn marker_path(path: &Path) -> Path {
    let mut marker = path.clone();
    if let Some(last) = marker.segments.last_mut() {
        last.ident = format_ident!("{}Interface", last.ident);
    }
    marker
}

/// 解析 `extends(A, b::B<T>)` 形式的路径列表
pub(crate) fn parse_paths(input: ParseStream) -> syn::Result<Vec<Path>> {
    let content;
    syn::parenthesized!(content in input);
    let paths = Punctuated::<Path, Token![,]>::parse_terminated(&content)?;
    Ok(paths.into_iter().collect())
}

/// 为每个类型参数追加 `'static` 约束
pub(crate) fn with_static_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    let idents: Vec<Ident> = generics.type_params().map(|param| param.ident.clone()).collect();
    if !idents.is_empty() {
        let where_clause = generics.make_where_clause();
        for ident in idents {
            where_clause.predicates.push(syn::parse_quote!(#ident: 'static));
        }
    }
    generics
}

/// 拒绝生命周期与常量泛型参数
pub(crate) fn check_type_params_only(generics: &Generics, what: &str) -> syn::Result<()> {
    for param in &generics.params {
        if !matches!(param, GenericParam::Type(_)) {
            return Err(syn::Error::new(
                param.span(),
                format!("{} may only declare type parameters", what),
            ));
        }
    }
    Ok(())
}
