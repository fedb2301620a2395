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

//! `Option<T>` as a packed value: `None` travels as `Null`.

use std::convert::TryFrom;

use crate::errors::Error;
use crate::object::IsObjectRef;
use crate::{ArgValue, RetValue};

impl<'a, T> From<Option<T>> for ArgValue<'a>
where
    ArgValue<'a>: From<T>,
{
    fn from(value: Option<T>) -> ArgValue<'a> {
        value.map(ArgValue::from).unwrap_or(ArgValue::Null)
    }
}

impl<T> From<Option<T>> for RetValue
where
    RetValue: From<T>,
{
    fn from(value: Option<T>) -> RetValue {
        value.map(RetValue::from).unwrap_or(RetValue::Null)
    }
}

impl<'a, T> TryFrom<ArgValue<'a>> for Option<T>
where
    T: IsObjectRef + TryFrom<ArgValue<'a>, Error = Error>,
{
    type Error = Error;

    fn try_from(arg: ArgValue<'a>) -> Result<Option<T>, Error> {
        if arg.is_null() {
            Ok(None)
        } else {
            T::try_from(arg).map(Some)
        }
    }
}

impl<T> TryFrom<RetValue> for Option<T>
where
    T: IsObjectRef + TryFrom<RetValue, Error = Error>,
{
    type Error = Error;

    fn try_from(ret: RetValue) -> Result<Option<T>, Error> {
        if ret.is_null() {
            Ok(None)
        } else {
            T::try_from(ret).map(Some)
        }
    }
}

macro_rules! impl_optional_pod {
    ($($type:ty),+) => {
        $(
            impl<'a> TryFrom<ArgValue<'a>> for Option<$type> {
                type Error = Error;

                fn try_from(arg: ArgValue<'a>) -> Result<Option<$type>, Error> {
                    if arg.is_null() {
                        Ok(None)
                    } else {
                        <$type>::try_from(arg).map(Some)
                    }
                }
            }

            impl TryFrom<RetValue> for Option<$type> {
                type Error = Error;

                fn try_from(ret: RetValue) -> Result<Option<$type>, Error> {
                    Option::<$type>::try_from(ArgValue::from(ret))
                }
            }
        )+
    };
}

impl_optional_pod!(i32, i64, f32, f64, bool, std::string::String);
