use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Expr, Field, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Type,
};

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let expanded = generate_injectable_impl(&input).unwrap_or_else(syn::Error::into_compile_error);
    TokenStream::from(expanded)
}

#[derive(Default)]
struct BeanOptions {
    id: Option<LitStr>,
    scope: Option<LitStr>,
    qualifiers: Vec<LitStr>,
    named: Option<LitStr>,
    alternative: bool,
    priority: Option<Expr>,
    default_bean: bool,
    bindings: Vec<LitStr>,
    post_construct: Vec<Ident>,
    pre_destroy: Vec<Ident>,
    exposes: Vec<Type>,
}

#[derive(Default)]
struct InjectOptions {
    qualifiers: Vec<LitStr>,
    named: Option<LitStr>,
    optional: bool,
    skip: bool,
}

/// How a field receives its value.
enum Access {
    Arc,
    BeanRef,
    Proxy,
}

fn parse_bean_options(input: &DeriveInput) -> syn::Result<BeanOptions> {
    let mut options = BeanOptions::default();
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("bean")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                options.id = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("scope") {
                options.scope = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("qualifier") {
                options.qualifiers.push(meta.value()?.parse()?);
            } else if meta.path.is_ident("named") {
                options.named = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("alternative") {
                options.alternative = true;
            } else if meta.path.is_ident("priority") {
                options.priority = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("default_bean") {
                options.default_bean = true;
            } else if meta.path.is_ident("binding") {
                options.bindings.push(meta.value()?.parse()?);
            } else if meta.path.is_ident("post_construct") {
                let method: LitStr = meta.value()?.parse()?;
                options.post_construct.push(method.parse()?);
            } else if meta.path.is_ident("pre_destroy") {
                let method: LitStr = meta.value()?.parse()?;
                options.pre_destroy.push(method.parse()?);
            } else if meta.path.is_ident("expose") {
                let content;
                syn::parenthesized!(content in meta.input);
                options.exposes.push(content.parse()?);
            } else {
                return Err(meta.error("unsupported #[bean] attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn parse_inject_options(field: &Field) -> syn::Result<InjectOptions> {
    let mut options = InjectOptions::default();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("inject")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("qualifier") {
                options.qualifiers.push(meta.value()?.parse()?);
            } else if meta.path.is_ident("named") {
                options.named = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("optional") {
                options.optional = true;
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else {
                return Err(meta.error("unsupported #[inject] attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn scope_tokens(scope: Option<&LitStr>) -> TokenStream2 {
    let Some(scope) = scope else {
        return quote!(::meshestra_cdi::bean::Scope::Dependent);
    };
    match scope.value().to_ascii_lowercase().as_str() {
        "dependent" => quote!(::meshestra_cdi::bean::Scope::Dependent),
        "singleton" => quote!(::meshestra_cdi::bean::Scope::Singleton),
        "application" => quote!(::meshestra_cdi::bean::Scope::Application),
        "request" => quote!(::meshestra_cdi::bean::Scope::Request),
        _ => quote!(::meshestra_cdi::bean::Scope::custom(#scope)),
    }
}

/// The single generic argument of the last path segment, if it is `name`.
fn generic_of<'t>(ty: &'t Type, name: &str) -> Option<&'t Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != name {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Split a field type into (optional, access, injected type).
fn classify(ty: &Type) -> Option<(bool, Access, &Type)> {
    let (optional, ty) = match generic_of(ty, "Option") {
        Some(inner) => (true, inner),
        None => (false, ty),
    };
    if let Some(inner) = generic_of(ty, "Arc") {
        return Some((optional, Access::Arc, inner));
    }
    if let Some(inner) = generic_of(ty, "BeanRef") {
        return Some((optional, Access::BeanRef, inner));
    }
    if let Some(inner) = generic_of(ty, "ClientProxy") {
        return Some((optional, Access::Proxy, inner));
    }
    None
}

fn generate_injectable_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Extract fields from the struct
    let fields: Vec<&Field> = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "#[derive(Injectable)] only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Injectable)] can only be applied to structs",
            ));
        }
    };

    let options = parse_bean_options(input)?;
    let id = options
        .id
        .clone()
        .unwrap_or_else(|| LitStr::new(&struct_name.to_string(), Span::call_site()));
    let scope = scope_tokens(options.scope.as_ref());

    let mut injection_points = Vec::new();
    let mut field_inits = Vec::new();
    for field in fields {
        let Some(field_name) = &field.ident else {
            continue;
        };
        let inject = parse_inject_options(field)?;
        if inject.skip {
            field_inits.push(quote! { #field_name: ::std::default::Default::default() });
            continue;
        }
        let (optional, access, injected) = classify(&field.ty).ok_or_else(|| {
            syn::Error::new_spanned(
                &field.ty,
                "injected fields must be Arc<T>, BeanRef<T>, ClientProxy<T> or an Option of them; use #[inject(skip)] otherwise",
            )
        })?;
        let name = field_name.to_string();

        let qualifiers = inject.qualifiers.iter().map(|qualifier| {
            quote! { .qualifier(::meshestra_cdi::bean::Qualifier::new(#qualifier)) }
        });
        let named = inject.named.iter().map(|named| {
            quote! { .qualifier(::meshestra_cdi::bean::Qualifier::named(#named)) }
        });
        let optional_marker = (optional || inject.optional).then(|| quote!(.optional()));
        let proxied_marker = matches!(access, Access::Proxy).then(|| quote!(.proxied()));
        injection_points.push(quote! {
            .inject(
                ::meshestra_cdi::bean::InjectionPoint::field(
                    #name,
                    ::meshestra_cdi::bean::BeanType::of::<#injected>(),
                )
                #(#qualifiers)*
                #(#named)*
                #optional_marker
                #proxied_marker
            )
        });

        let accessor = match (access, optional) {
            (Access::Arc, false) => quote!(arc),
            (Access::Arc, true) => quote!(arc_optional),
            (Access::BeanRef, false) => quote!(get),
            (Access::BeanRef, true) => quote!(get_optional),
            (Access::Proxy, false) => quote!(proxy),
            (Access::Proxy, true) => quote!(proxy_optional),
        };
        field_inits.push(quote! { #field_name: args.#accessor::<#injected>(#name)? });
    }

    let qualifiers = options.qualifiers.iter().map(|qualifier| {
        quote! { .qualifier(::meshestra_cdi::bean::Qualifier::new(#qualifier)) }
    });
    let named = options.named.iter().map(|named| quote! { .named(#named) });
    let alternative = options.alternative.then(|| quote!(.alternative()));
    let priority = options.priority.iter().map(|priority| quote! { .priority(#priority) });
    let default_bean = options.default_bean.then(|| quote!(.default_bean()));
    let bindings = options.bindings.iter().map(|binding| {
        quote! { .interceptor_binding(::meshestra_cdi::intercept::InterceptorBinding::new(#binding)) }
    });
    let exposes = options.exposes.iter().map(|exposed| {
        quote! {
            .expose::<#exposed, _>(|bean: ::std::sync::Arc<Self>| -> ::std::sync::Arc<#exposed> { bean })
        }
    });
    let unused_args = injection_points.is_empty().then(|| quote!(let _ = args;));
    let post_construct = options.post_construct.iter().map(|method| {
        quote! { .post_construct(|bean: &Self| bean.#method()) }
    });
    let pre_destroy = options.pre_destroy.iter().map(|method| {
        quote! { .pre_destroy(|bean: &Self| bean.#method()) }
    });

    Ok(quote! {
        impl #impl_generics ::meshestra_cdi::di::Injectable for #struct_name #ty_generics #where_clause {
            fn declaration() -> ::meshestra_cdi::bean::BeanBuilder<Self> {
                ::meshestra_cdi::bean::BeanBuilder::<Self>::class(#id)
                    .scope(#scope)
                    #(#qualifiers)*
                    #(#named)*
                    #alternative
                    #(#priority)*
                    #default_bean
                    #(#bindings)*
                    #(#exposes)*
                    #(#injection_points)*
                    .constructor(|args: &::meshestra_cdi::bean::InjectionArgs| {
                        #unused_args
                        ::std::result::Result::Ok(Self {
                            #(#field_inits),*
                        })
                    })
                    #(#post_construct)*
                    #(#pre_destroy)*
            }
        }
    })
}
