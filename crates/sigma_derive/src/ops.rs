use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, LitStr, Path, Token, WherePredicate, punctuated::Punctuated,
    spanned::Spanned,
};

/// Options given through `#[tensor_op(...)]` on the struct itself.
#[derive(Default)]
struct OpAttrs {
    /// Path of the crate that defines `loom::ops`; `::sigma` when absent.
    krate: Option<Path>,
    /// Extra where-predicates for the generated impl.
    bounds: Punctuated<WherePredicate, Token![,]>,
}

impl OpAttrs {
    fn parse(input: &DeriveInput) -> syn::Result<Self> {
        let mut attrs = Self::default();
        for attr in input.attrs.iter().filter(|a| a.path().is_ident("tensor_op")) {
            attr.parse_nested_meta(|meta| {
                let value: LitStr = meta.value()?.parse()?;
                match meta.path.get_ident().map(ToString::to_string).as_deref() {
                    Some("crate") => attrs.krate = Some(value.parse()?),
                    Some("bound") => attrs
                        .bounds
                        .extend(value.parse_with(Punctuated::<WherePredicate, Token![,]>::parse_terminated)?),
                    _ => return Err(meta.error("expected `crate = \"..\"` or `bound = \"..\"`")),
                }
                Ok(())
            })?;
        }
        Ok(attrs)
    }

    fn ops_path(&self) -> TokenStream {
        match &self.krate {
            Some(krate) => quote!(#krate::loom::ops),
            None => quote!(::sigma::loom::ops),
        }
    }
}

/// The expression of the inner op that carries the id and io of the derived op.
///
/// A newtype forwards to its only field; a struct with named fields forwards to the one field
/// marked `#[tensor_op]`.
fn inner_op(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "`TensorOp` can only be derived for structs"));
    };
    match &data.fields {
        Fields::Unnamed(fields) if fields.unnamed.len() == 1 => Ok(quote!(self.0)),
        Fields::Unnamed(fields) => Err(syn::Error::new(
            fields.span(),
            "a tuple struct op must wrap exactly one inner op",
        )),
        Fields::Named(fields) => {
            let mut marked = fields
                .named
                .iter()
                .filter(|field| field.attrs.iter().any(|a| a.path().is_ident("tensor_op")));
            match (marked.next(), marked.next()) {
                (Some(field), None) => {
                    let ident = &field.ident;
                    Ok(quote!(self.#ident))
                }
                (None, _) => Err(syn::Error::new(
                    fields.span(),
                    "mark the inner op field with #[tensor_op]",
                )),
                (Some(_), Some(field)) => Err(syn::Error::new(
                    field.span(),
                    "only one field can be marked with #[tensor_op]",
                )),
            }
        }
        Fields::Unit => Err(syn::Error::new(
            input.span(),
            "a unit struct has no inner op to forward to",
        )),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let inner = inner_op(&input)?;
    let attrs = OpAttrs::parse(&input)?;
    let ops = attrs.ops_path();

    let name = &input.ident;
    let (impl_generics, ty_generics, _) = input.generics.split_for_impl();
    let mut generics = input.generics.clone();
    let where_clause = generics.make_where_clause();
    where_clause.predicates.extend(attrs.bounds);

    // forwarding goes through the trait path so callers need not import `TensorOp`
    Ok(quote! {
        impl #impl_generics #ops::TensorOp for #name #ty_generics #where_clause {
            #[inline]
            fn id(&self) -> #ops::TensorOpId {
                #ops::TensorOp::id(&#inner)
            }

            #[inline]
            fn io(&self) -> Vec<#ops::TensorIr> {
                #ops::TensorOp::io(&#inner)
            }

            #[inline]
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    })
}

pub fn derive_tensor_op(input: DeriveInput) -> TokenStream {
    expand(input).unwrap_or_else(|err| err.to_compile_error())
}
