use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        ));
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            ));
        }
    };

    let formstate = formstate_path();
    let mut kind_entries = Vec::new();
    let mut value_entries = Vec::new();
    let mut from_fields = Vec::new();
    let mut path_methods = Vec::new();

    for field in &named_fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_ty = &field.ty;
        let key = field_key(field, field_ident)?;

        kind_entries.push(quote! {
            (
                ::std::string::String::from(#key),
                <#field_ty as #formstate::form::FieldModel>::kind(),
            )
        });
        value_entries.push(quote! {
            (
                ::std::string::String::from(#key),
                #formstate::form::FieldModel::to_value(&self.#field_ident),
            )
        });
        from_fields.push(quote! {
            #field_ident: <#field_ty as #formstate::form::FieldModel>::from_value(fields.get(#key)?)?
        });
        path_methods.push(quote! {
            pub fn #field_ident(&self) -> #formstate::form::FieldPath {
                #formstate::form::FieldPath::root().key(#key)
            }
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#path_methods)*
        }

        impl #formstate::form::FieldModel for #model_ident {
            fn kind() -> #formstate::form::FieldKind {
                #formstate::form::FieldKind::Group(::std::collections::BTreeMap::from([
                    #(#kind_entries),*
                ]))
            }

            fn to_value(&self) -> #formstate::form::FieldValue {
                #formstate::form::FieldValue::Group(::std::collections::BTreeMap::from([
                    #(#value_entries),*
                ]))
            }

            fn from_value(
                value: &#formstate::form::FieldValue,
            ) -> ::core::option::Option<Self> {
                #[allow(unused_variables)]
                let fields = value.as_group()?;
                ::core::option::Option::Some(Self {
                    #(#from_fields),*
                })
            }
        }

        impl #formstate::form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }
        }
    })
}

/// Key of a field in the value tree: `#[form(rename = "...")]` or the field
/// name without any raw-identifier prefix.
fn field_key(field: &Field, field_ident: &Ident) -> syn::Result<String> {
    let mut key = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                key = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }

    let key = key.unwrap_or_else(|| field_ident.unraw().to_string());
    if key.is_empty() || key.contains('.') || key == "*" || key.starts_with('#') {
        return Err(syn::Error::new_spanned(
            field_ident,
            "form field key must be a plain name without `.`, `#` or `*`",
        ));
    }
    if key.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(syn::Error::new_spanned(
            field_ident,
            "form field key must not be all digits",
        ));
    }
    Ok(key)
}

/// `::formstate` as seen from the deriving crate. The crate itself declares
/// `extern crate self as formstate`, so the same path works internally.
fn formstate_path() -> TokenStream2 {
    match crate_name("formstate") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) | Err(_) => quote!(::formstate),
    }
}
