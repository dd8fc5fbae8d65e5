//! The built-in intrinsic library.
//!
//! The compiler seeds every compilation with this SOUL source, parsed
//! like user code. The functions are generic, carry an
//! `[[intrin: "name"]]` tag, and have no bodies; the back-end implements
//! them, and the constant folder evaluates calls whose arguments are all
//! constants.

use soul_ir::intrinsic::IntrinsicType;
use soul_ir::types::StructStore;
use soul_ir::value::Value;

/// Name of the namespace unqualified function lookups fall back to.
pub const INTRINSICS_NAMESPACE: [&str; 2] = ["soul", "intrinsics"];

/// SOUL source of the built-in library.
pub const BUILT_IN_LIBRARY: &str = r#"
namespace soul::intrinsics
{
    T abs<T> (T n)                    [[ intrin: "abs" ]];
    T min<T> (T a, T b)               [[ intrin: "min" ]];
    T max<T> (T a, T b)               [[ intrin: "max" ]];
    T clamp<T> (T n, T low, T high)   [[ intrin: "clamp" ]];
    T wrap<T> (T n, T range)          [[ intrin: "wrap" ]];
    T floor<T> (T n)                  [[ intrin: "floor" ]];
    T ceil<T> (T n)                   [[ intrin: "ceil" ]];
    T fmod<T> (T a, T b)              [[ intrin: "fmod" ]];
    T sqrt<T> (T n)                   [[ intrin: "sqrt" ]];
    T pow<T> (T a, T b)               [[ intrin: "pow" ]];
    T exp<T> (T n)                    [[ intrin: "exp" ]];
    T log<T> (T n)                    [[ intrin: "log" ]];
    T log10<T> (T n)                  [[ intrin: "log10" ]];
    T sin<T> (T n)                    [[ intrin: "sin" ]];
    T cos<T> (T n)                    [[ intrin: "cos" ]];
    T tan<T> (T n)                    [[ intrin: "tan" ]];
}
"#;

/// Evaluate an intrinsic over constant arguments, or `None` when the
/// combination stays a runtime call.
pub fn fold_intrinsic(
    intrinsic: IntrinsicType,
    args: &[Value],
    structs: &StructStore,
) -> Option<Value> {
    use IntrinsicType::*;

    let all_float = args.iter().all(|a| a.get_type().is_primitive_float());
    let all_int = args.iter().all(|a| a.get_type().is_primitive_integer());

    let float_result = |v: f64| -> Option<Value> {
        let t = args[0].get_type().clone();
        Value::float64(v).cast_to_type(&t, structs).ok()
    };

    match intrinsic {
        Abs if all_int => Some(reint(args, args[0].get_as_i64()?.wrapping_abs())),
        Abs if all_float => float_result(args[0].get_as_f64()?.abs()),

        Min if all_int => Some(reint(args, args[0].get_as_i64()?.min(args[1].get_as_i64()?))),
        Min if all_float => float_result(args[0].get_as_f64()?.min(args[1].get_as_f64()?)),

        Max if all_int => Some(reint(args, args[0].get_as_i64()?.max(args[1].get_as_i64()?))),
        Max if all_float => float_result(args[0].get_as_f64()?.max(args[1].get_as_f64()?)),

        Clamp if all_int => {
            let (n, low, high) = (
                args[0].get_as_i64()?,
                args[1].get_as_i64()?,
                args[2].get_as_i64()?,
            );
            Some(reint(args, n.clamp(low.min(high), high.max(low))))
        }
        Clamp if all_float => {
            let (n, low, high) = (
                args[0].get_as_f64()?,
                args[1].get_as_f64()?,
                args[2].get_as_f64()?,
            );
            float_result(n.clamp(low.min(high), high.max(low)))
        }

        Wrap if all_int => {
            let range = args[1].get_as_i64()?;
            if range == 0 {
                return Option::None;
            }
            Some(reint(args, args[0].get_as_i64()?.rem_euclid(range)))
        }
        Wrap if all_float => {
            let range = args[1].get_as_f64()?;
            if range == 0.0 {
                return Option::None;
            }
            float_result(args[0].get_as_f64()?.rem_euclid(range))
        }

        Floor if all_float => float_result(args[0].get_as_f64()?.floor()),
        Ceil if all_float => float_result(args[0].get_as_f64()?.ceil()),

        Fmod if all_float => {
            let b = args[1].get_as_f64()?;
            if b == 0.0 {
                return Option::None;
            }
            float_result(args[0].get_as_f64()? % b)
        }

        Sqrt if all_float => float_result(args[0].get_as_f64()?.sqrt()),
        Pow if all_float => float_result(args[0].get_as_f64()?.powf(args[1].get_as_f64()?)),
        Exp if all_float => float_result(args[0].get_as_f64()?.exp()),
        Log if all_float => float_result(args[0].get_as_f64()?.ln()),
        Log10 if all_float => float_result(args[0].get_as_f64()?.log10()),
        Sin if all_float => float_result(args[0].get_as_f64()?.sin()),
        Cos if all_float => float_result(args[0].get_as_f64()?.cos()),
        Tan if all_float => float_result(args[0].get_as_f64()?.tan()),

        _ => Option::None,
    }
}

/// Rebuild an integer result with the width of the first argument.
fn reint(args: &[Value], v: i64) -> Value {
    if args[0].get_type().is_integer64() {
        Value::int64(v)
    } else {
        Value::int32(v as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structs() -> StructStore {
        StructStore::new()
    }

    #[test]
    fn folds_integer_min_max() {
        let r = fold_intrinsic(
            IntrinsicType::Max,
            &[Value::int32(3), Value::int32(7)],
            &structs(),
        );
        assert_eq!(r, Some(Value::int32(7)));
    }

    #[test]
    fn folds_float_and_keeps_width() {
        let r = fold_intrinsic(IntrinsicType::Sqrt, &[Value::float32(4.0)], &structs());
        assert_eq!(r, Some(Value::float32(2.0)));
        let r = fold_intrinsic(IntrinsicType::Sqrt, &[Value::float64(4.0)], &structs());
        assert_eq!(r, Some(Value::float64(2.0)));
    }

    #[test]
    fn sqrt_of_int_stays_runtime() {
        assert_eq!(
            fold_intrinsic(IntrinsicType::Sqrt, &[Value::int32(4)], &structs()),
            None
        );
    }

    #[test]
    fn wrap_is_euclidean() {
        let r = fold_intrinsic(
            IntrinsicType::Wrap,
            &[Value::int32(-1), Value::int32(8)],
            &structs(),
        );
        assert_eq!(r, Some(Value::int32(7)));
    }
}
