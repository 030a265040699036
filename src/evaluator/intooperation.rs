use crate::Error;
use crate::ast::{Natural, Number, Operand, as_boolean, as_natural, as_number, as_string};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

// NOTE: This module is internal plumbing for the evaluator.
// It turns strongly-typed Rust functions into the erased `OperationFn`
// stored in the builtin catalog. Operand coercion happens here, through
// the `as_*` functions of `ast.rs`, so builtin bodies only ever see
// concrete Rust types.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their evaluated operands, enabling
/// implementations that consume string payloads without cloning.
pub(crate) type OperationFn = dyn Fn(Vec<Operand>) -> Result<Operand, Error> + Send + Sync;

// =====================================================================
// Fixed-position parameter conversion
// =====================================================================

/// Core trait used by the fixed-arity adapters to turn operands into
/// strongly-typed parameters.
///
/// The associated `Param<'a>` type is the parameter type as seen by
/// the builtin for a given lifetime of the local operand slots.
pub(crate) trait FromParam {
    type Param<'a>;

    /// Convert a single operand into this parameter type, either by
    /// borrowing from it (`&str`) or by consuming it (`Operand`).
    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Operand {
    type Param<'a> = Operand;

    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(operand, Operand::Unknown(String::new())))
    }
}

impl FromParam for Number {
    type Param<'a> = Number;

    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error> {
        as_number(operand)
    }
}

impl FromParam for Natural {
    type Param<'a> = Natural;

    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error> {
        as_natural(operand)
    }
}

impl FromParam for bool {
    type Param<'a> = bool;

    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error> {
        as_boolean(operand)
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(operand: &'a mut Operand) -> Result<Self::Param<'a>, Error> {
        as_string(operand)
    }
}

// =====================================================================
// Typed iterators over the operand tail (rest parameters)
// =====================================================================

/// Marker trait describing how to view an operand slice as a typed
/// iterator. `precheck` validates every element up front so that a
/// type error surfaces even when the builtin would not pull every
/// element; `project` then maps each operand to the element type.
#[doc(hidden)]
pub trait OperandElementKind {
    type Item<'a>;

    fn precheck(slice: &[Operand]) -> Result<(), Error>;
    fn project<'a>(operand: &'a Operand) -> Self::Item<'a>;
}

/// Generic iterator over a slice of operands, parameterized by an
/// [`OperandElementKind`] that determines the element type.
#[doc(hidden)]
pub struct TypedOperandIter<'a, K: OperandElementKind> {
    inner: std::slice::Iter<'a, Operand>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedOperandIter<'a, K>
where
    K: OperandElementKind,
{
    pub(crate) fn new(operands: &'a [Operand]) -> Result<Self, Error> {
        K::precheck(operands)?;
        Ok(TypedOperandIter {
            inner: operands.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for TypedOperandIter<'a, K>
where
    K: OperandElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let operand = self.inner.next()?;
        Some(K::project(operand))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for TypedOperandIter<'_, K> where K: OperandElementKind {}
impl<K> FusedIterator for TypedOperandIter<'_, K> where K: OperandElementKind {}

#[doc(hidden)]
pub struct NumberElem;

impl OperandElementKind for NumberElem {
    type Item<'a> = Number;

    fn precheck(slice: &[Operand]) -> Result<(), Error> {
        slice.iter().try_for_each(|operand| as_number(operand).map(|_| ()))
    }

    fn project<'a>(operand: &'a Operand) -> Self::Item<'a> {
        match operand {
            Operand::Number(n) => *n,
            Operand::Natural(n) => n.to_number(),
            _ => {
                debug_assert!(false, "NumberElem::project saw non-number after precheck");
                unreachable!("NumberElem invariant violated")
            }
        }
    }
}

#[doc(hidden)]
pub struct BoolElem;

impl OperandElementKind for BoolElem {
    type Item<'a> = bool;

    fn precheck(slice: &[Operand]) -> Result<(), Error> {
        slice.iter().try_for_each(|operand| as_boolean(operand).map(|_| ()))
    }

    fn project<'a>(operand: &'a Operand) -> Self::Item<'a> {
        if let Operand::Bool(b) = operand {
            *b
        } else {
            debug_assert!(false, "BoolElem::project saw non-boolean after precheck");
            unreachable!("BoolElem invariant violated")
        }
    }
}

#[doc(hidden)]
pub struct StringElem;

impl OperandElementKind for StringElem {
    type Item<'a> = &'a str;

    fn precheck(slice: &[Operand]) -> Result<(), Error> {
        slice.iter().try_for_each(|operand| as_string(operand).map(|_| ()))
    }

    fn project<'a>(operand: &'a Operand) -> Self::Item<'a> {
        if let Operand::String(s) = operand {
            s.as_str()
        } else {
            debug_assert!(false, "StringElem::project saw non-string after precheck");
            unreachable!("StringElem invariant violated")
        }
    }
}

/// Borrowed iterator over numeric operands (naturals widen to numbers)
pub type NumIter<'a> = TypedOperandIter<'a, NumberElem>;

/// Borrowed iterator over boolean operands
pub type BoolIter<'a> = TypedOperandIter<'a, BoolElem>;

/// Borrowed iterator over string operands
pub type StringIter<'a> = TypedOperandIter<'a, StringElem>;

/// Core trait used to construct rest-parameter values from the operand tail
pub(crate) trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Operand]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedOperandIter<'static, K>
where
    K: OperandElementKind,
{
    type Param<'a> = TypedOperandIter<'a, K>;

    fn from_rest<'a>(slice: &'a [Operand]) -> Result<Self::Param<'a>, Error> {
        TypedOperandIter::<K>::new(slice)
    }
}

// =====================================================================
// Return-type adaptation
// =====================================================================

/// Normalizes builtin return types to `Result<Operand, Error>`.
pub(crate) trait IntoOperandResult {
    fn into_operand_result(self) -> Result<Operand, Error>;
}

impl<T> IntoOperandResult for Result<T, Error>
where
    T: Into<Operand>,
{
    fn into_operand_result(self) -> Result<Operand, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoOperandResult for T
where
    T: Into<Operand>,
{
    fn into_operand_result(self) -> Result<Operand, Error> {
        Ok(self.into())
    }
}

/// Converts a strongly-typed fixed-arity function into the erased
/// [`OperationFn`], parameterized by its argument tuple type.
pub(crate) trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Converts a function whose last parameter is a typed rest iterator
/// into the erased [`OperationFn`].
pub(crate) trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

/// Error for an operand list that does not line up with a typed signature.
/// Parse-time arity validation makes this unreachable from source text.
fn operand_count_error(expected: usize, got: usize) -> Error {
    if got < expected {
        Error::NullOperand(format!("expected {expected} operands, got {got}"))
    } else {
        Error::arity_error("operation", expected, got)
    }
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoOperandResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Operand>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            (self)(rest_param).into_operand_result()
        })
    }
}

/// Implements `IntoVariadicOperation` for a fixed prefix of `FromParam`
/// parameters followed by a single rest iterator.
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + Send
                + Sync
                + 'static,
            R: IntoOperandResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Operand>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            (self)( $( $p ),+, rest_param ).into_operand_result()
                        }
                        _ => Err(operand_count_error($prefix, len)),
                    }
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);

/// Implements `IntoOperation` for functions of a fixed arity: the operand
/// vector is destructured into local slots so that `FromParam` can borrow
/// from or consume each one before the builtin runs.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoOperandResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Operand>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            (self)( $( $p ),+ ).into_operand_result()
                        }
                        _ => Err(operand_count_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{OperandKind, num};

    #[test]
    fn test_fixed_adapter_converts_operands() {
        fn halve(n: Number) -> Number {
            Number::propagate(n.value / 2.0, &[n])
        }

        let op = <_ as IntoOperation<(Number,)>>::into_operation(halve);
        assert_eq!(op(vec![num(8.0)]).unwrap(), num(4.0));
        assert_eq!(
            op(vec![Operand::Bool(true)]).unwrap_err(),
            Error::type_conversion(OperandKind::Boolean, OperandKind::Number)
        );
    }

    #[test]
    fn test_missing_operand_is_null_operand_error() {
        fn both(a: bool, b: bool) -> bool {
            a && b
        }

        let op = <_ as IntoOperation<(bool, bool)>>::into_operation(both);
        assert!(matches!(
            op(vec![Operand::Bool(true)]).unwrap_err(),
            Error::NullOperand(_)
        ));
        assert!(matches!(
            op(vec![Operand::Bool(true); 3]).unwrap_err(),
            Error::Arity { .. }
        ));
    }

    #[test]
    fn test_rest_iterator_prechecks_every_element() {
        fn count(args: NumIter<'_>) -> Natural {
            Natural::exact(args.len() as u64)
        }

        let op = <_ as IntoVariadicOperation<(NumIter<'static>,)>>::into_variadic_operation(count);
        assert_eq!(
            op(vec![num(1.0), Operand::Natural(Natural::exact(2))]).unwrap(),
            Operand::Natural(Natural::exact(2))
        );
        assert_eq!(
            op(vec![num(1.0), Operand::from("two")]).unwrap_err(),
            Error::type_conversion(OperandKind::String, OperandKind::Number)
        );
    }

    #[test]
    fn test_borrowed_string_parameters() {
        fn joined(head: &str, rest: StringIter<'_>) -> String {
            rest.fold(head.to_owned(), |acc, s| acc + s)
        }

        let op = <_ as IntoVariadicOperation<(&'static str, StringIter<'static>)>>::into_variadic_operation(joined);
        assert_eq!(
            op(vec![Operand::from("a"), Operand::from("b"), Operand::from("c")]).unwrap(),
            Operand::from("abc")
        );
    }
}
