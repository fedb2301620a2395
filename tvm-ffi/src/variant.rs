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

use std::convert::TryFrom;

use crate::errors::Error;
use crate::{ArgValue, RetValue};

/// A value that is one of two types.
///
/// Conversion tries `A` first and falls back to `B`; only when both fail is
/// an error reported, naming both alternatives.
#[derive(Clone, Debug, PartialEq)]
pub enum Variant<A, B> {
    First(A),
    Second(B),
}

impl<A, B> Variant<A, B> {
    pub fn as_first(&self) -> Option<&A> {
        match self {
            Variant::First(a) => Some(a),
            Variant::Second(_) => None,
        }
    }

    pub fn as_second(&self) -> Option<&B> {
        match self {
            Variant::First(_) => None,
            Variant::Second(b) => Some(b),
        }
    }
}

impl<'a, A, B> From<Variant<A, B>> for ArgValue<'a>
where
    ArgValue<'a>: From<A> + From<B>,
{
    fn from(variant: Variant<A, B>) -> ArgValue<'a> {
        match variant {
            Variant::First(a) => a.into(),
            Variant::Second(b) => b.into(),
        }
    }
}

impl<A, B> From<Variant<A, B>> for RetValue
where
    RetValue: From<A> + From<B>,
{
    fn from(variant: Variant<A, B>) -> RetValue {
        match variant {
            Variant::First(a) => a.into(),
            Variant::Second(b) => b.into(),
        }
    }
}

impl<'a, A, B> TryFrom<ArgValue<'a>> for Variant<A, B>
where
    A: TryFrom<ArgValue<'a>, Error = Error>,
    B: TryFrom<ArgValue<'a>, Error = Error>,
{
    type Error = Error;

    fn try_from(arg: ArgValue<'a>) -> Result<Variant<A, B>, Error> {
        let actual = arg.type_name();
        if let Ok(a) = A::try_from(arg.clone()) {
            return Ok(Variant::First(a));
        }
        B::try_from(arg).map(Variant::Second).map_err(|_| {
            let expected = format!(
                "Variant[{}, {}]",
                crate::to_function::short_type_name::<A>(),
                crate::to_function::short_type_name::<B>()
            );
            Error::downcast(actual, expected)
        })
    }
}

impl<A, B> TryFrom<RetValue> for Variant<A, B>
where
    A: for<'a> TryFrom<ArgValue<'a>, Error = Error>,
    B: for<'a> TryFrom<ArgValue<'a>, Error = Error>,
{
    type Error = Error;

    fn try_from(ret: RetValue) -> Result<Variant<A, B>, Error> {
        Variant::try_from(ArgValue::from(ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Array, String};

    #[test]
    fn tries_alternatives_in_order() {
        type IntOrString = Variant<i64, String>;
        assert_eq!(
            IntOrString::try_from(RetValue::Int(3)).unwrap(),
            Variant::First(3)
        );
        let second = IntOrString::try_from(RetValue::Str("three".into())).unwrap();
        assert_eq!(*second.as_second().unwrap(), "three");
        assert!(second.as_first().is_none());
    }

    #[test]
    fn reports_both_alternatives() {
        type Either = Variant<i64, Array<String>>;
        let err = Either::try_from(RetValue::Str("nope".into())).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Variant[i64, Array<String>]"), "{}", message);
        assert!(message.contains("str"), "{}", message);
    }

    #[test]
    fn into_value() {
        let v: Variant<i64, f64> = Variant::Second(1.5);
        assert!(matches!(ArgValue::from(v), ArgValue::Float(x) if x == 1.5));
    }
}
