/*
 * Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! Conversion of typed Rust functions into packed functions.
//!
//! Any `Fn(A0, .., An) -> O` with up to six arguments becomes a
//! [`Function`] whose arguments are converted with `TryFrom<ArgValue>` and
//! whose result is converted with `TryInto<RetValue>`. The argument count
//! must match exactly.

use std::convert::{TryFrom, TryInto};

use crate::errors::{Error, Result};
use crate::function::Function;
use crate::{ArgValue, RetValue};

/// The typed view of a function signature.
pub trait Typed<I, O> {
    /// Converts raw arguments into the typed argument tuple. `function` names
    /// the callee in error messages.
    fn args(function: &str, args: Vec<ArgValue<'_>>) -> Result<I>;

    fn ret(out: O) -> Result<RetValue>;

    /// A readable signature such as `(0: i64, 1: i64) -> i64`.
    fn signature() -> String;
}

pub trait ToFunction<I, O>: Sized {
    fn to_function(self) -> Function {
        self.to_function_named(None)
    }

    /// Like `to_function`, with a name used in argument errors.
    fn to_function_named(self, name: Option<String>) -> Function;
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// The name of `T` with every module path stripped, e.g. `Vec<String>`
/// instead of `alloc::vec::Vec<tvm_ffi::string::String>`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut token = String::new();
    for c in full.chars() {
        if "<>,()[]&; ".contains(c) {
            out.push_str(last_segment(&token));
            token.clear();
            out.push(c);
        } else {
            token.push(c);
        }
    }
    out.push_str(last_segment(&token));
    out
}

macro_rules! to_function_instance {
    ($len:literal; $($param:ident $var:ident $index:tt),*) => {
        impl<Fun, Out, $($param,)*> Typed<($($param,)*), Out> for Fun
        where
            Fun: Fn($($param),*) -> Out,
            Out: TryInto<RetValue>,
            Error: From<<Out as TryInto<RetValue>>::Error>,
            $($param: for<'a> TryFrom<ArgValue<'a>, Error = Error> + 'static,)*
        {
            #[allow(unused_variables)]
            fn args(function: &str, args: Vec<ArgValue<'_>>) -> Result<($($param,)*)> {
                let [$($var),*]: [ArgValue<'_>; $len] =
                    <[ArgValue<'_>; $len]>::try_from(args).map_err(|args| Error::ArgCountMismatch {
                        function: function.to_string(),
                        signature: Self::signature(),
                        expected: $len,
                        actual: args.len(),
                    })?;
                Ok(($(
                    <$param>::try_from($var).map_err(|err| Error::ArgConversion {
                        function: function.to_string(),
                        signature: Self::signature(),
                        index: $index,
                        source: Box::new(err),
                    })?,
                )*))
            }

            fn ret(out: Out) -> Result<RetValue> {
                Ok(out.try_into()?)
            }

            fn signature() -> String {
                let params: Vec<String> = vec![$(format!("{}: {}", $index, short_type_name::<$param>())),*];
                format!("({}) -> {}", params.join(", "), short_type_name::<Out>())
            }
        }

        impl<Fun, Out, $($param,)*> ToFunction<($($param,)*), Out> for Fun
        where
            Fun: Fn($($param),*) -> Out + Send + Sync + 'static,
            Out: TryInto<RetValue> + 'static,
            Error: From<<Out as TryInto<RetValue>>::Error>,
            $($param: for<'a> TryFrom<ArgValue<'a>, Error = Error> + 'static,)*
        {
            fn to_function_named(self, name: Option<String>) -> Function {
                let name = name.unwrap_or_else(|| "<anonymous>".to_string());
                Function::from_packed(move |args: Vec<ArgValue<'_>>| {
                    let ($($var,)*) = <Fun as Typed<($($param,)*), Out>>::args(&name, args)?;
                    <Fun as Typed<($($param,)*), Out>>::ret(self($($var),*))
                })
            }
        }
    };
}

to_function_instance!(0;);
to_function_instance!(1; A a 0);
to_function_instance!(2; A a 0, B b 1);
to_function_instance!(3; A a 0, B b 1, C c 2);
to_function_instance!(4; A a 0, B b 1, C c 2, D d 3);
to_function_instance!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
to_function_instance!(6; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_packed;
    use crate::string::String as TString;

    fn zero() -> i32 {
        10
    }

    fn one_arg(i: i32) -> i32 {
        i
    }

    fn two_arg(i: i64, j: i64) -> i64 {
        i + j
    }

    #[test]
    fn test_to_function0() -> Result<()> {
        let func = zero.to_function();
        let ret: i32 = func.invoke(vec![])?.try_into()?;
        assert_eq!(ret, 10);
        Ok(())
    }

    #[test]
    fn test_fn_ptr() -> Result<()> {
        let fn_ptr: fn(i32) -> i32 = one_arg;
        let func = fn_ptr.to_function();
        let ret: i32 = func.invoke(vec![12i32.into()])?.try_into()?;
        assert_eq!(ret, 12);
        Ok(())
    }

    #[test]
    fn test_to_function2() -> Result<()> {
        let func = two_arg.to_function();
        let ret: i64 = call_packed!(func, 3, 4)?.try_into()?;
        assert_eq!(ret, 7);
        Ok(())
    }

    #[test]
    fn arity_is_exact() {
        let func = two_arg.to_function_named(Some("add".into()));
        let err = call_packed!(func, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Function add(0: i64, 1: i64) -> i64 expects 2 arguments, but 1 were provided."
        );
        let err = call_packed!(func, 1, 2, 3).unwrap_err();
        assert!(matches!(err, Error::ArgCountMismatch { actual: 3, .. }));
    }

    #[test]
    fn argument_errors_name_the_index() {
        let func = two_arg.to_function();
        let err = call_packed!(func, 1, "x").unwrap_err();
        let message = err.to_string();
        assert!(
            message.starts_with("In function <anonymous>(0: i64, 1: i64) -> i64: error while converting argument 1:"),
            "{}",
            message
        );
    }

    #[test]
    fn results_propagate() {
        let func = (|s: TString| -> Result<i64> {
            s.as_str().parse::<i64>().map_err(|e| Error::Raw(e.to_string()))
        })
        .to_function();
        let ok: i64 = call_packed!(func, "42").unwrap().try_into().unwrap();
        assert_eq!(ok, 42);
        assert!(call_packed!(func, "nope").is_err());
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name::<TString>(), "String");
        assert_eq!(short_type_name::<Vec<TString>>(), "Vec<String>");
        assert_eq!(short_type_name::<(i64, &str)>(), "(i64, &str)");
    }
}
