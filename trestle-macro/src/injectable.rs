use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr, Type};

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let expanded = generate_injectable_impl(&input).unwrap_or_else(syn::Error::into_compile_error);
    TokenStream::from(expanded)
}

/// How one field is filled.
enum Slot {
    Dependency { key: TokenStream2, ty: Type },
    Default,
}

fn generate_injectable_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Injectable)] can only be applied to structs",
            ))
        }
    };

    let (keys, body) = match &data.fields {
        Fields::Named(fields) => {
            let slots = fields
                .named
                .iter()
                .map(field_slot)
                .collect::<syn::Result<Vec<_>>>()?;
            let keys = dependency_keys(&slots);
            let inits = fields.named.iter().zip(&slots).map(|(field, slot)| {
                let name = &field.ident;
                let value = slot_value(slot);
                quote!(#name: #value)
            });
            (keys, quote!(Self { #(#inits),* }))
        }
        Fields::Unnamed(fields) => {
            let slots = fields
                .unnamed
                .iter()
                .map(field_slot)
                .collect::<syn::Result<Vec<_>>>()?;
            let keys = dependency_keys(&slots);
            let inits = slots.iter().map(slot_value);
            (keys, quote!(Self(#(#inits),*)))
        }
        Fields::Unit => (Vec::new(), quote!(Self)),
    };

    Ok(quote! {
        impl #impl_generics ::trestle::di::Injectable for #struct_name #ty_generics #where_clause {
            fn dependencies() -> ::std::vec::Vec<::trestle::di::ProvideKey> {
                ::std::vec![#(#keys),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn construct(mut deps: ::trestle::di::Dependencies) -> ::trestle::Result<Self> {
                ::std::result::Result::Ok(#body)
            }
        }
    })
}

fn dependency_keys(slots: &[Slot]) -> Vec<TokenStream2> {
    slots
        .iter()
        .filter_map(|slot| match slot {
            Slot::Dependency { key, .. } => Some(key.clone()),
            Slot::Default => None,
        })
        .collect()
}

fn slot_value(slot: &Slot) -> TokenStream2 {
    match slot {
        Slot::Dependency { ty, .. } => quote!(deps.next::<#ty>()?),
        Slot::Default => quote!(::std::default::Default::default()),
    }
}

fn field_slot(field: &Field) -> syn::Result<Slot> {
    let mut name: Option<LitStr> = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("inject")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        })?;
    }

    match (extract_arc_inner(&field.ty), name) {
        (Some(ty), Some(name)) => Ok(Slot::Dependency {
            key: quote!(::trestle::di::ProvideKey::named(#name)),
            ty,
        }),
        (Some(ty), None) => Ok(Slot::Dependency {
            key: quote!(::trestle::di::ProvideKey::of::<#ty>()),
            ty,
        }),
        (None, Some(name)) => Err(syn::Error::new_spanned(
            name,
            "#[inject(name)] requires a field of type Arc<T>",
        )),
        (None, None) => Ok(Slot::Default),
    }
}

/// Extract the inner type from Arc<T> or Arc<dyn Trait>
fn extract_arc_inner(ty: &Type) -> Option<Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Arc" {
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(syn::GenericArgument::Type(inner_type)) = args.args.first() {
                        return Some(inner_type.clone());
                    }
                }
            }
        }
    }
    None
}
