//! `#[intercepted]` 宏实现

use crate::marshal::{
    analyze, call_body, check_type_params_only, marker_path, parse_paths, signature_tokens,
    strip_out_attrs, with_static_bounds,
};
use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::parse::{Parse, ParseStream};
use syn::spanned::Spanned;
use syn::{Attribute, Expr, ImplItem, ItemImpl, Path, Token, Type};

/// `#[intercepted(inherits(Parent, ...))]` 的参数
#[derive(Default)]
pub(crate) struct InterceptedArgs {
    inherits: Vec<Path>,
}

impl InterceptedArgs {
    pub(crate) fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("inherits") {
            self.inherits.extend(parse_paths(meta.input)?);
            Ok(())
        } else {
            Err(meta.error("unsupported intercepted property, expected `inherits`"))
        }
    }
}

/// `#[interceptor(Handler, order = N)]`
struct InterceptorAttr {
    handler: Type,
    order: Option<Expr>,
}

impl Parse for InterceptorAttr {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let handler: Type = input.parse()?;
        let mut order = None;
        while input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let key: syn::Ident = input.parse()?;
            if key != "order" {
                return Err(syn::Error::new(key.span(), "expected `order = <i32>`"));
            }
            input.parse::<Token![=]>()?;
            order = Some(input.parse()?);
        }
        Ok(InterceptorAttr { handler, order })
    }
}

/// 取出并移除方法上的 `#[interceptor]` 属性
fn take_interceptors(attrs: &mut Vec<Attribute>) -> syn::Result<Vec<InterceptorAttr>> {
    let mut interceptors = Vec::new();
    let mut kept = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        if attr.path().is_ident("interceptor") {
            interceptors.push(attr.parse_args::<InterceptorAttr>()?);
        } else {
            kept.push(attr);
        }
    }
    *attrs = kept;
    Ok(interceptors)
}

pub(crate) fn impl_intercepted(args: InterceptedArgs, mut item: ItemImpl) -> syn::Result<TokenStream> {
    let trait_path = match &item.trait_ {
        Some((None, path, _)) => path.clone(),
        Some((Some(bang), _, _)) => {
            return Err(syn::Error::new(bang.span(), "negative impls cannot be intercepted"))
        }
        None => {
            return Err(syn::Error::new(
                item.self_ty.span(),
                "#[intercepted] must be placed on an `impl Trait for Type` block",
            ))
        }
    };
    check_type_params_only(&item.generics, "intercepted impls")?;

    let mut bindings = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let interceptors = take_interceptors(&mut method.attrs)?;
        let info = analyze(&method.sig)?;
        strip_out_attrs(&mut method.sig);

        let signature = signature_tokens(&info);
        let method_name = info.ident.to_string();
        let concrete = if info.is_generic() {
            quote!(::interpose::ConcreteMethod::open(#signature))
        } else {
            let method_ident = &info.ident;
            let call = quote!(<Self as #trait_path>::#method_ident);
            let body = call_body(&info, &call);
            quote! {
                ::interpose::ConcreteMethod::bind::<Self, _>(
                    #signature,
                    |__target: &Self, __slots: &mut ::interpose::Args| { #body },
                )
            }
        };
        let directives = interceptors.iter().map(|attr| {
            let handler = &attr.handler;
            let order = attr
                .order
                .as_ref()
                .map(|order| quote!(#order))
                .unwrap_or_else(|| quote!(0));
            quote!(.intercept(::interpose::handler_type::<#handler>(), #order))
        });
        bindings.push(quote! {
            .method(
                #concrete
                    .implements(&__interface, #method_name)
                    #(#directives)*
            )
        });
    }

    let marker = marker_path(&trait_path);
    let parents: Vec<Path> = args.inherits.iter().map(marker_path).collect();

    let mut generics = with_static_bounds(&item.generics);
    if generics.type_params().next().is_some() {
        let self_ty = &item.self_ty;
        generics.make_where_clause().predicates.push(syn::parse_quote!(
            #self_ty: ::std::marker::Send + ::std::marker::Sync
        ));
    }
    let (impl_generics, _, where_clause) = generics.split_for_impl();
    let self_ty = &item.self_ty;

    Ok(quote! {
        #item

        impl #impl_generics ::interpose::ImplementationOf<#marker> for #self_ty #where_clause {
            fn bind(class: ::interpose::ClassBuilder) -> ::interpose::ClassBuilder {
                let __interface = <#marker as ::interpose::Interface>::descriptor();
                let class = class
                    .implements(::std::sync::Arc::clone(&__interface))
                    #(#bindings)*;
                #(let class = <Self as ::interpose::ImplementationOf<#parents>>::bind(class);)*
                class
            }
        }
    })
}
