//! `#[interface]` 宏实现

use crate::marshal::{
    analyze, call_body, check_type_params_only, marker_path, parse_paths, signature_tokens,
    strip_out_attrs, MethodInfo, Mode,
};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{FnArg, GenericParam, Ident, ItemTrait, LitStr, Path, Signature, TraitItem};

/// `#[interface(name = "...", extends(Parent, ...))]` 的参数
#[derive(Default)]
pub(crate) struct InterfaceArgs {
    name: Option<LitStr>,
    extends: Vec<Path>,
}

impl InterfaceArgs {
    pub(crate) fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("extends") {
            self.extends.extend(parse_paths(meta.input)?);
            Ok(())
        } else {
            Err(meta.error("unsupported interface property, expected `name` or `extends`"))
        }
    }
}

struct TraitMethod {
    sig: Signature,
    info: MethodInfo,
}

pub(crate) fn impl_interface(args: InterfaceArgs, mut item: ItemTrait) -> syn::Result<TokenStream> {
    check_type_params_only(&item.generics, "interface traits")?;
    if let Some(token) = &item.unsafety {
        return Err(syn::Error::new(token.span(), "unsafe traits cannot be intercepted"));
    }

    let mut methods = Vec::new();
    for trait_item in item.items.iter_mut() {
        match trait_item {
            TraitItem::Fn(method) => {
                let info = analyze(&method.sig)?;
                strip_out_attrs(&mut method.sig);
                methods.push(TraitMethod {
                    sig: method.sig.clone(),
                    info,
                });
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "interface traits may only declare methods",
                ))
            }
        }
    }

    let trait_ident = &item.ident;
    let vis = &item.vis;
    let marker = format_ident!("{}Interface", trait_ident);
    let name = args
        .name
        .map(|name| name.value())
        .unwrap_or_else(|| trait_ident.to_string());

    let type_params: Vec<Ident> = item.generics.type_params().map(|p| p.ident.clone()).collect();
    let marker_decl = if type_params.is_empty() {
        quote!(#vis struct #marker;)
    } else {
        quote!(#vis struct #marker<#(#type_params),*>(::std::marker::PhantomData<fn() -> (#(#type_params,)*)>);)
    };

    let bounded = crate::marshal::with_static_bounds(&item.generics);
    let (impl_generics, ty_generics, where_clause) = bounded.split_for_impl();
    let marker_ty = quote!(#marker #ty_generics);

    let parents: Vec<Path> = args.extends.iter().map(marker_path).collect();
    let signatures = methods.iter().map(|method| signature_tokens(&method.info));
    let marker_doc = format!("`{}` 的接口标记", trait_ident);

    let descriptor_impl = quote! {
        impl #impl_generics ::interpose::Interface for #marker_ty #where_clause {
            fn descriptor() -> ::std::sync::Arc<::interpose::TypeDescriptor> {
                ::interpose::TypeDescriptor::interface::<Self>()
                    .named(#name)
                    #(.generic_arg::<#type_params>())*
                    #(.extends(<#parents as ::interpose::Interface>::descriptor()))*
                    #(.method(#signatures))*
                    .build()
            }
        }

        impl #impl_generics ::interpose::Extends<#marker_ty> for #marker_ty #where_clause {}

        #(impl #impl_generics ::interpose::Extends<#parents> for #marker_ty #where_clause {})*
    };

    let shim = proxy_shim(&item, &name, &marker_ty, &parents, &methods);

    Ok(quote! {
        #item

        #[doc = #marker_doc]
        #marker_decl

        #descriptor_impl

        #shim
    })
}

/// 为 `Proxy<__M, __C>` 实现 trait：把调用编组为槽位，经代理实例分派
fn proxy_shim(
    item: &ItemTrait,
    name: &str,
    marker_ty: &TokenStream,
    parents: &[Path],
    methods: &[TraitMethod],
) -> TokenStream {
    let trait_ident = &item.ident;
    let (_, trait_ty_generics, _) = item.generics.split_for_impl();

    let mut generics = item.generics.clone();
    let type_params: Vec<Ident> = generics.type_params().map(|p| p.ident.clone()).collect();
    generics.params.push(GenericParam::Type(syn::parse_quote!(__M)));
    generics.params.push(GenericParam::Type(syn::parse_quote!(__C)));
    {
        let where_clause = generics.make_where_clause();
        for param in &type_params {
            where_clause.predicates.push(syn::parse_quote!(
                #param: ::std::clone::Clone + ::std::marker::Send + 'static
            ));
        }
        where_clause
            .predicates
            .push(syn::parse_quote!(__M: ::interpose::Extends<#marker_ty>));
        for parent in parents {
            where_clause
                .predicates
                .push(syn::parse_quote!(__M: ::interpose::Extends<#parent>));
        }
        where_clause.predicates.push(syn::parse_quote!(
            __C: #trait_ident #trait_ty_generics + ::std::marker::Send + ::std::marker::Sync + 'static
        ));
    }
    let (impl_generics, _, where_clause) = generics.split_for_impl();

    let trait_ref = quote!(#trait_ident #trait_ty_generics);
    let bodies = methods
        .iter()
        .map(|method| shim_method(name, &trait_ref, method));

    quote! {
        impl #impl_generics #trait_ref for ::interpose::Proxy<__M, __C> #where_clause {
            #(#bodies)*
        }
    }
}

fn shim_method(name: &str, trait_ref: &TokenStream, method: &TraitMethod) -> TokenStream {
    let info = &method.info;
    let qualified = format!("{}::{}", name, info.ident);

    let mut sig = method.sig.clone();
    let mut index = 0usize;
    for input in sig.inputs.iter_mut() {
        if let FnArg::Typed(typed) = input {
            let ident = format_ident!("__p{}", index);
            typed.pat = Box::new(syn::parse_quote!(#ident));
            typed.attrs.clear();
            index += 1;
        }
    }

    let mut pushes = Vec::new();
    let mut write_backs = Vec::new();
    for (index, param) in info.params.iter().enumerate() {
        let ident = format_ident!("__p{}", index);
        match param.mode {
            Mode::Value => pushes.push(quote!(__args.push_value(#ident);)),
            Mode::Ref => pushes.push(quote!(__args.push_value(::std::clone::Clone::clone(&*#ident));)),
            Mode::Out => pushes.push(quote!(__args.push_unset();)),
        }
        if param.mode != Mode::Value {
            write_backs.push(quote!(
                ::interpose::__private::write_back(__METHOD, &mut __args, #index, #ident);
            ));
        }
    }

    let arity = info.params.len();
    let invoke = if info.is_generic() {
        let method_ident = &info.ident;
        let type_args = &info.generics;
        let param_types = info.params.iter().map(|param| &param.ty);
        let returns = info.output.as_ref().map(|ty| quote!(.returns::<#ty>()));
        let call = quote!(<__C as #trait_ref>::#method_ident::<#(#type_args),*>);
        let body = call_body(info, &call);
        quote! {
            let __closed = ::interpose::ClosedMethod::new()
                #(.type_arg::<#type_args>())*
                #(.param::<#param_types>())*
                #returns;
            let __target: &__C = ::interpose::Proxy::target(self);
            let __terminal = |__slots: &mut ::interpose::Args|
                -> ::interpose::ProxyResult<::std::option::Option<::interpose::Value>> {
                #body
            };
            let __result = ::interpose::Proxy::instance(self)
                .invoke_generic(__METHOD, &__closed, &mut __args, &__terminal);
        }
    } else {
        quote! {
            let __result = ::interpose::Proxy::instance(self).invoke(__METHOD, &mut __args);
        }
    };

    let finish = match &info.output {
        Some(ty) => quote! {
            let __value = ::interpose::__private::returned::<#ty>(__METHOD, __result);
            #(#write_backs)*
            __value
        },
        None => quote! {
            ::interpose::__private::completed(__METHOD, __result);
            #(#write_backs)*
        },
    };

    quote! {
        #sig {
            const __METHOD: &str = #qualified;
            let mut __args = ::interpose::Args::with_capacity(#arity);
            #(#pushes)*
            #invoke
            #finish
        }
    }
}
