use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Ident, LitInt};

/// Expands to `build_api_{n}`, which records an `n`-input, one-output op on the output's tape.
pub fn build_api(input: LitInt) -> syn::Result<TokenStream> {
    let n = input.base10_parse::<usize>()?;

    let tensor_params = (0..n)
        .map(|i| Ident::new(&format!("t{i}"), Span::call_site()))
        .collect::<Vec<_>>();

    let tape_clones = tensor_params
        .iter()
        .map(|ti| quote! { #ti.tape().ops.clone() })
        .collect::<Vec<_>>();

    let ir_calls = tensor_params
        .iter()
        .map(|ti| quote! { #ti.ir() })
        .collect::<Vec<_>>();

    let generics = quote! {
        D: Device + Clone,
        U: Scalar,
        Op: TensorOp + 'static,
        F: FnOnce(InnerOp<#n, 1>) -> Op,
    };

    let fn_name = Ident::new(&format!("build_api_{n}"), Span::call_site());

    Ok(quote! {
        #[allow(unused)]
        fn #fn_name<D, U, Op, F>(
            f: F,
            mut output: Tensor<D, U>,
            #(#tensor_params: Tensor<D, impl Scalar>),*
        ) -> Tensor<D, U>
        where
            #generics
        {
            use ::itertools::Itertools;

            let mut ops = vec![#(#tape_clones),*]
                .concat()
                .into_iter()
                .unique_by(|op| op.id())
                .collect_vec();

            let inputs = [#(#ir_calls),*];
            let outputs = [output.ir()];
            let op = f(InnerOp::new(inputs, outputs));
            ops.push(Box::new(op));
            output.replace_ops(ops);

            output
        }
    })
}
