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

//! Typed Rust closures over packed functions, and the [`Builder`] for
//! assembling a call argument by argument.

use std::convert::TryFrom;

use crate::errors::{Error, Result};
use crate::function::Function;
use crate::{ArgValue, RetValue};

pub trait ToBoxedFn {
    fn to_boxed_fn(func: Function) -> Box<Self>;
}

macro_rules! to_boxed_fn_instance {
    ($($param:ident $var:ident),*) => {
        impl<RetErr, $($param,)* O> ToBoxedFn for dyn Fn($($param),*) -> Result<O>
        where
            Error: From<RetErr>,
            $($param: Into<ArgValue<'static>>,)*
            O: TryFrom<RetValue, Error = RetErr>,
        {
            fn to_boxed_fn(func: Function) -> Box<Self> {
                Box::new(move |$($var: $param),*| {
                    #[allow(unused_mut)]
                    let mut builder = Builder::from(&func);
                    $(builder.arg::<ArgValue<'static>>($var.into());)*
                    let res = builder.invoke()?;
                    Ok(O::try_from(res)?)
                })
            }
        }
    };
}

to_boxed_fn_instance!();
to_boxed_fn_instance!(A a);
to_boxed_fn_instance!(A a, B b);
to_boxed_fn_instance!(A a, B b, C c);
to_boxed_fn_instance!(A a, B b, C c, D d);
to_boxed_fn_instance!(A a, B b, C c, D d, E e);
to_boxed_fn_instance!(A a, B b, C c, D d, E e, G g);

/// Function builder in order to create and call functions.
///
/// *Note:* Currently TVM functions accept *at most* one return value.
#[derive(Default)]
pub struct Builder<'a, 'm> {
    pub func: Option<&'m Function>,
    pub arg_buf: Vec<ArgValue<'a>>,
    pub ret_buf: Option<RetValue>,
}

impl<'a, 'm> Builder<'a, 'm> {
    pub fn new(
        func: Option<&'m Function>,
        arg_buf: Vec<ArgValue<'a>>,
        ret_buf: Option<RetValue>,
    ) -> Self {
        Self {
            func,
            arg_buf,
            ret_buf,
        }
    }

    pub fn get_function(&mut self, name: &str) -> &mut Self {
        self.func = Function::get(name);
        self
    }

    /// Pushes a [`ArgValue`] into the function argument buffer.
    pub fn arg<T: 'a>(&mut self, arg: T) -> &mut Self
    where
        ArgValue<'a>: From<T>,
    {
        self.arg_buf.push(arg.into());
        self
    }

    /// Pushes multiple [`ArgValue`]s into the function argument buffer.
    pub fn args<T: 'a, I>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        ArgValue<'a>: From<T>,
    {
        args.into_iter().for_each(|arg| {
            self.arg(arg);
        });
        self
    }

    /// Sets the value returned when the callee itself returns nothing.
    pub fn set_output<T>(&mut self, ret: T) -> &mut Self
    where
        RetValue: From<T>,
    {
        self.ret_buf = Some(ret.into());
        self
    }

    pub fn invoke(self) -> Result<RetValue> {
        let func = self.func.ok_or(Error::FunctionNotSet)?;
        match (func.invoke(self.arg_buf)?, self.ret_buf) {
            (RetValue::Null, Some(output)) => Ok(output),
            (ret, _) => Ok(ret),
        }
    }
}

/// Converts a [`Function`] to builder.
impl<'a, 'm> From<&'m Function> for Builder<'a, 'm> {
    fn from(func: &'m Function) -> Self {
        Builder::new(Some(func), Vec::new(), None)
    }
}
