use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    Data, DeriveInput, Error as SynError, Fields, Generics, Ident, LitInt,
    Result as SynResult, parse_macro_input, parse_quote,
};

struct CodeAttr {
    value: u32,
}

impl syn::parse::Parse for CodeAttr {
    fn parse(input: syn::parse::ParseStream) -> SynResult<Self> {
        let lit: LitInt = input.parse()?;
        Ok(Self {
            value: lit.base10_parse()?,
        })
    }
}

struct VariantInfo {
    ident: Ident,
    fields: Fields,
    code: Option<u32>,
}

struct EnumInput {
    ident: Ident,
    generics: Generics,
    variants: Vec<VariantInfo>,
}

impl syn::parse::Parse for EnumInput {
    fn parse(input: syn::parse::ParseStream) -> SynResult<Self> {
        let di: DeriveInput = input.parse()?;
        let ident = di.ident;
        let generics = di.generics;
        let data = match di.data {
            Data::Enum(e) => e,
            _ => {
                return Err(SynError::new(
                    Span::call_site(),
                    "BusinessError can only be derived for enums",
                ));
            }
        };
        let mut variants = Vec::new();
        for v in data.variants {
            let code = v
                .attrs
                .iter()
                .find(|a| a.path().is_ident("code"))
                .and_then(|a| a.parse_args::<CodeAttr>().ok())
                .map(|c| c.value);
            variants.push(VariantInfo {
                ident: v.ident,
                fields: v.fields,
                code,
            });
        }
        Ok(Self {
            ident,
            generics,
            variants,
        })
    }
}

/// Attaches a stable numeric client-facing error code to selected enum
/// variants via `#[code(N)]`. Variants without the attribute return `None`.
#[proc_macro_derive(BusinessError, attributes(code))]
pub fn derive_business_error(input: TokenStream) -> TokenStream {
    let EnumInput {
        ident,
        generics,
        variants,
    } = parse_macro_input!(input as EnumInput);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut arms = Vec::new();
    for v in variants.iter() {
        if let Some(code) = v.code {
            let v_ident = &v.ident;
            let pat = match &v.fields {
                Fields::Unit => quote!(Self::#v_ident),
                Fields::Unnamed(_) => quote!(Self::#v_ident(..)),
                Fields::Named(_) => quote!(Self::#v_ident { .. }),
            };
            arms.push(quote!(#pat => Some(#code),));
        }
    }

    let biz_trait: syn::Path = parse_quote!(crate::errors::BusinessErrorCode);
    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics #biz_trait for #ident #ty_generics #where_clause {
            fn code(&self) -> Option<u32> {
                match self {
                    #(#arms)*
                    _ => None,
                }
            }
        }
    };
    TokenStream::from(expanded)
}
