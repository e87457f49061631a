//! End-to-end tests driving the builder and both execution modes.
//!
//! Every runtime assertion goes through `run_both`, which executes the same
//! lambda interpreted and compiled and requires the two results to agree
//! before anything else is checked.

use std::rc::Rc;

use exprtree::build;
use exprtree::prelude::*;

fn int_ty() -> Ty {
    Ty::Primitive(PrimitiveKind::I32)
}

fn int(v: i32) -> NodeRef {
    build::constant(Value::I32(v)).unwrap()
}

fn text(s: &str) -> NodeRef {
    build::constant(Value::str(s)).unwrap()
}

fn run_both(catalog: &Rc<Catalog>, lambda: &NodeRef, args: &[Value]) -> Result<Value, EvalError> {
    let interpreted = prepare(catalog.clone(), lambda, ExecMode::Interpret).unwrap();
    let compiled = prepare(catalog.clone(), lambda, ExecMode::Compile).unwrap();
    let a = interpreted.invoke(args);
    let b = compiled.invoke(args);
    assert_eq!(a, b, "execution modes disagree");
    a
}

#[test]
fn add_of_two_parameters() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let y = build::parameter(int_ty(), "y").unwrap();
    let body = build::add(&catalog, x.clone(), y.clone()).unwrap();
    let lambda = build::lambda(vec![x, y], body).unwrap();
    let result = run_both(&catalog, &lambda, &[Value::I32(3), Value::I32(4)]);
    assert_eq!(result, Ok(Value::I32(7)));
}

#[test]
fn invoking_with_wrong_arity_fails() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let lambda = build::lambda(vec![x.clone()], x).unwrap();
    let prepared = prepare(catalog, &lambda, ExecMode::Compile).unwrap();
    assert_eq!(
        prepared.invoke(&[]),
        Err(EvalError::ArityMismatch { expected: 1, actual: 0 })
    );
}

#[test]
fn mixed_numeric_operands_promote() {
    let catalog = Rc::new(Catalog::new());
    let small = build::constant(Value::I8(3)).unwrap();
    let wide = build::constant(Value::I64(4)).unwrap();
    let body = build::multiply(&catalog, small, wide).unwrap();
    assert_eq!(body.ty, Ty::Primitive(PrimitiveKind::I64));
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I64(12)));
}

#[test]
fn u64_mixed_with_signed_does_not_resolve() {
    let catalog = Rc::new(Catalog::new());
    let a = build::constant(Value::U64(1)).unwrap();
    let b = int(1);
    assert!(matches!(
        build::add(&catalog, a, b),
        Err(BuildError::NoOperator { .. })
    ));
}

#[test]
fn decimal_never_mixes_with_floats() {
    let catalog = Rc::new(Catalog::new());
    let d = build::constant(Value::Decimal(Decimal::from_i64(1))).unwrap();
    let f = build::constant(Value::F64(1.0)).unwrap();
    assert!(matches!(
        build::add(&catalog, d, f),
        Err(BuildError::NoOperator { .. })
    ));
}

#[test]
fn decimal_arithmetic_is_exact() {
    let catalog = Rc::new(Catalog::new());
    let a = build::constant(Value::Decimal(Decimal::from_raw(1_500_000_000))).unwrap();
    let b = build::constant(Value::Decimal(Decimal::from_raw(2_250_000_000))).unwrap();
    let lambda = build::lambda(vec![], build::add(&catalog, a, b).unwrap()).unwrap();
    assert_eq!(
        run_both(&catalog, &lambda, &[]),
        Ok(Value::Decimal(Decimal::from_raw(3_750_000_000)))
    );
}

// === Null propagation and lifting ===

#[test]
fn lifted_add_propagates_null() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let body = build::add(&catalog, x.clone(), int(1)).unwrap();
    assert_eq!(body.ty, Ty::nullable(int_ty()));
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::Null));
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(41)]), Ok(Value::I32(42)));
}

#[test]
fn lifted_equality_treats_null_as_a_value() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let y = build::parameter(Ty::nullable(int_ty()), "y").unwrap();
    let body = build::equal(&catalog, x.clone(), y.clone()).unwrap();
    assert_eq!(body.ty, Ty::Bool);
    let lambda = build::lambda(vec![x, y], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null, Value::Null]), Ok(Value::Bool(true)));
    assert_eq!(
        run_both(&catalog, &lambda, &[Value::Null, Value::I32(0)]),
        Ok(Value::Bool(false))
    );
    assert_eq!(
        run_both(&catalog, &lambda, &[Value::I32(2), Value::I32(2)]),
        Ok(Value::Bool(true))
    );
}

#[test]
fn lifted_relational_is_three_valued() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let body = build::less_than(&catalog, x.clone(), int(10)).unwrap();
    assert_eq!(body.ty, Ty::nullable(Ty::Bool));
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::Null));
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(3)]), Ok(Value::Bool(true)));
}

#[test]
fn comparison_against_null_literal() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let null = build::constant(Value::Null).unwrap();
    let body = build::not_equal(&catalog, x.clone(), null).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(1)]), Ok(Value::Bool(true)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::Bool(false)));
}

// === Short-circuiting ===

#[test]
fn and_also_skips_the_right_operand() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::Bool, "x").unwrap();
    // The right operand divides by zero; it must only run when reached.
    let explode = build::equal(
        &catalog,
        build::divide(&catalog, int(1), int(0)).unwrap(),
        int(1),
    )
    .unwrap();
    let body = build::and_also(&catalog, x.clone(), explode).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(false)]), Ok(Value::Bool(false)));
    assert_eq!(
        run_both(&catalog, &lambda, &[Value::Bool(true)]),
        Err(EvalError::DivisionByZero)
    );
}

#[test]
fn or_else_skips_the_right_operand() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::Bool, "x").unwrap();
    let explode = build::equal(
        &catalog,
        build::divide(&catalog, int(1), int(0)).unwrap(),
        int(1),
    )
    .unwrap();
    let body = build::or_else(&catalog, x.clone(), explode).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(true)]), Ok(Value::Bool(true)));
}

#[test]
fn and_also_requires_bool_operands() {
    let catalog = Rc::new(Catalog::new());
    assert!(matches!(
        build::and_also(&catalog, int(1), int(2)),
        Err(BuildError::NoOperator { .. })
    ));
}

// === Coalesce ===

#[test]
fn coalesce_takes_the_left_value_when_present() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let body = build::coalesce(&catalog, x.clone(), int(-1)).unwrap();
    assert_eq!(body.ty, int_ty());
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(5)]), Ok(Value::I32(5)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::I32(-1)));
}

#[test]
fn coalesce_skips_the_right_operand() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let explode = build::divide(&catalog, int(1), int(0)).unwrap();
    let body = build::coalesce(&catalog, x.clone(), explode).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(9)]), Ok(Value::I32(9)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Err(EvalError::DivisionByZero));
}

#[test]
fn coalesce_needs_a_nullable_left_operand() {
    let catalog = Rc::new(Catalog::new());
    assert!(matches!(
        build::coalesce(&catalog, int(1), int(2)),
        Err(BuildError::InvalidOperation { .. })
    ));
}

// === Checked and unchecked arithmetic ===

#[test]
fn checked_add_reports_unchecked_wraps() {
    let catalog = Rc::new(Catalog::new());
    let max = int(i32::MAX);
    let wrapped = build::add(&catalog, max.clone(), int(1)).unwrap();
    let lambda = build::lambda(vec![], wrapped).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(i32::MIN)));

    let checked = build::add_checked(&catalog, max, int(1)).unwrap();
    let lambda = build::lambda(vec![], checked).unwrap();
    assert_eq!(
        run_both(&catalog, &lambda, &[]),
        Err(EvalError::Overflow { target: "i32".into() })
    );
}

#[test]
fn checked_conversion_reports_unchecked_truncates() {
    let catalog = Rc::new(Catalog::new());
    let huge = build::constant(Value::U64(u64::MAX)).unwrap();
    let target = Ty::Primitive(PrimitiveKind::I8);

    let truncated = build::convert(&catalog, huge.clone(), target.clone()).unwrap();
    let lambda = build::lambda(vec![], truncated).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I8(-1)));

    let checked = build::convert_checked(&catalog, huge, target).unwrap();
    let lambda = build::lambda(vec![], checked).unwrap();
    assert_eq!(
        run_both(&catalog, &lambda, &[]),
        Err(EvalError::Overflow { target: "i8".into() })
    );
}

#[test]
fn unwrapping_an_empty_nullable_fails() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let body = build::convert(&catalog, x.clone(), int_ty()).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(3)]), Ok(Value::I32(3)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Err(EvalError::NullUnwrap));
}

// === Switch ===

#[test]
fn switch_picks_the_first_declared_match() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let cases = vec![
        build::switch_case(vec![int(1)], text("first")).unwrap(),
        // Duplicate test value: declaration order decides.
        build::switch_case(vec![int(1), int(2)], text("second")).unwrap(),
    ];
    let body = build::switch_(&catalog, x.clone(), cases, Some(text("default"))).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(1)]), Ok(Value::str("first")));
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(2)]), Ok(Value::str("second")));
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(9)]), Ok(Value::str("default")));
}

#[test]
fn switch_on_a_nullable_subject() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::nullable(int_ty()), "x").unwrap();
    let null_test = build::constant_of(&catalog, Value::Null, Ty::nullable(int_ty())).unwrap();
    let cases = vec![
        build::switch_case(vec![int(1)], text("one")).unwrap(),
        build::switch_case(vec![null_test], text("empty")).unwrap(),
    ];
    let body = build::switch_(&catalog, x.clone(), cases, Some(text("other"))).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(1)]), Ok(Value::str("one")));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::str("empty")));
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(7)]), Ok(Value::str("other")));
}

#[test]
fn empty_void_switch_is_legal() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let body = build::switch_(&catalog, x.clone(), vec![], None).unwrap();
    assert_eq!(body.ty, Ty::Void);
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(3)]), Ok(Value::Null));
}

#[test]
fn default_only_switch_yields_the_default() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let body = build::switch_(&catalog, x.clone(), vec![], Some(text("fallback"))).unwrap();
    assert_eq!(body.ty, Ty::Str);
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(3)]), Ok(Value::str("fallback")));
}

#[test]
fn value_switch_without_default_is_rejected() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let cases = vec![build::switch_case(vec![int(1)], text("one")).unwrap()];
    assert!(matches!(
        build::switch_(&catalog, x, cases, None),
        Err(BuildError::InvalidOperation { .. })
    ));
}

// === Conditionals, blocks, assignment ===

#[test]
fn conditional_branches() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(Ty::Bool, "x").unwrap();
    let body = build::conditional(&catalog, x.clone(), text("yes"), text("no")).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(true)]), Ok(Value::str("yes")));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(false)]), Ok(Value::str("no")));
}

#[test]
fn block_variables_and_assignment() {
    let catalog = Rc::new(Catalog::new());
    let v = build::variable(int_ty(), "v").unwrap();
    let body = build::block(
        vec![v.clone()],
        vec![
            build::assign(&catalog, v.clone(), int(20)).unwrap(),
            build::assign(
                &catalog,
                v.clone(),
                build::add(&catalog, v.clone(), int(22)).unwrap(),
            )
            .unwrap(),
            v.clone(),
        ],
    )
    .unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(42)));
}

// === Strings ===

#[test]
fn string_concatenation_and_equality() {
    let catalog = Rc::new(Catalog::new());
    let joined = build::add(&catalog, text("ab"), text("cd")).unwrap();
    let body = build::equal(&catalog, joined, text("abcd")).unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::Bool(true)));
}

// === User-defined types and operators ===

fn vec2_value(x: f64, y: f64) -> Value {
    let mut fields = rustc_hash::FxHashMap::default();
    fields.insert("x".to_string(), Value::F64(x));
    fields.insert("y".to_string(), Value::F64(y));
    Value::object(TypeHash::from_name("Vec2"), fields)
}

fn read_f64(value: &Value, name: &str) -> f64 {
    let obj = value.as_obj().unwrap().borrow();
    match obj.fields.get(name) {
        Some(Value::F64(v)) => *v,
        other => panic!("expected f64 field, got {:?}", other),
    }
}

fn vec2_catalog() -> Rc<Catalog> {
    let mut catalog = Catalog::new();
    let hash = TypeHash::from_name("Vec2");
    let ty = Ty::Object(hash);
    let add: NativeFn = Rc::new(|_, args| {
        let (ax, ay) = (read_f64(&args[0], "x"), read_f64(&args[0], "y"));
        let (bx, by) = (read_f64(&args[1], "x"), read_f64(&args[1], "y"));
        Ok(vec2_value(ax + bx, ay + by))
    });
    catalog.register(
        StructEntry::new("Vec2", true)
            .with_field("x", Ty::Primitive(PrimitiveKind::F64))
            .with_field("y", Ty::Primitive(PrimitiveKind::F64))
            .with_operator("op_add", vec![ParamDef::new(ty.clone()), ParamDef::new(ty.clone())], ty, add),
    );
    Rc::new(catalog)
}

#[test]
fn user_defined_operator_resolves() {
    let catalog = vec2_catalog();
    let a = build::constant(vec2_value(1.0, 2.0)).unwrap();
    let b = build::constant(vec2_value(3.0, 4.0)).unwrap();
    let body = build::add(&catalog, a, b).unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    // Each mode builds a fresh object; compare fields, not handles.
    for mode in [ExecMode::Interpret, ExecMode::Compile] {
        let prepared = prepare(catalog.clone(), &lambda, mode).unwrap();
        let result = prepared.invoke(&[]).unwrap();
        assert_eq!(read_f64(&result, "x"), 4.0);
        assert_eq!(read_f64(&result, "y"), 6.0);
    }
}

#[test]
fn explicit_method_overrides_search() {
    let mut catalog = Catalog::new();
    let times: NativeFn = Rc::new(|_, args| {
        match (&args[0], &args[1]) {
            (Value::I32(a), Value::I32(b)) => Ok(Value::I32(a * b)),
            _ => unreachable!(),
        }
    });
    let hash = catalog.register(StructEntry::new("Math", false).with_static_method(
        "times",
        vec![ParamDef::new(int_ty()), ParamDef::new(int_ty())],
        int_ty(),
        times,
    ));
    let method = catalog
        .get(hash)
        .unwrap()
        .methods
        .iter()
        .find(|m| m.name == "times")
        .cloned()
        .unwrap();
    let catalog = Rc::new(catalog);

    // Resolution would pick primitive addition; the explicit method wins.
    let body = build::binary_with_method(&catalog, BinaryOp::Add, int(3), int(4), method).unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(12)));
}

// === User-defined conversion operators ===

fn celsius_ty() -> Ty {
    Ty::Object(TypeHash::from_name("Celsius"))
}

fn celsius(deg: f64) -> Value {
    let mut fields = rustc_hash::FxHashMap::default();
    fields.insert("deg".to_string(), Value::F64(deg));
    Value::object(TypeHash::from_name("Celsius"), fields)
}

fn celsius_catalog() -> Rc<Catalog> {
    let mut catalog = Catalog::new();
    let ty = celsius_ty();
    let f64_ty = Ty::Primitive(PrimitiveKind::F64);
    let widen: NativeFn = Rc::new(|_, args| Ok(Value::F64(read_f64(&args[0], "deg"))));
    let truncated: NativeFn =
        Rc::new(|_, args| Ok(Value::F64(read_f64(&args[0], "deg").trunc())));
    let narrow: NativeFn = Rc::new(|_, args| Ok(Value::I32(read_f64(&args[0], "deg") as i32)));
    let kelvin: NativeFn = Rc::new(|_, args| Ok(Value::F64(read_f64(&args[0], "deg") + 273.0)));
    catalog.register(
        StructEntry::new("Celsius", true)
            .with_field("deg", f64_ty.clone())
            .with_conversion("op_implicit", ty.clone(), f64_ty.clone(), widen)
            .with_conversion("op_explicit", ty.clone(), f64_ty.clone(), truncated)
            .with_conversion("op_explicit", ty.clone(), int_ty(), narrow)
            .with_static_method("kelvin", vec![ParamDef::new(ty)], f64_ty, kelvin),
    );
    Rc::new(catalog)
}

#[test]
fn implicit_conversion_operator_applies_during_coercion() {
    let catalog = celsius_catalog();
    let flag = build::parameter(Ty::Bool, "flag").unwrap();
    let c = build::constant(celsius(21.5)).unwrap();
    let fallback = build::constant(Value::F64(0.0)).unwrap();
    // The branches only share a type through the op_implicit operator.
    let body = build::conditional(&catalog, flag.clone(), c, fallback).unwrap();
    assert_eq!(body.ty, Ty::Primitive(PrimitiveKind::F64));
    let lambda = build::lambda(vec![flag], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(true)]), Ok(Value::F64(21.5)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Bool(false)]), Ok(Value::F64(0.0)));
}

#[test]
fn implicit_conversion_preferred_over_explicit() {
    let catalog = celsius_catalog();
    let c = build::constant(celsius(21.5)).unwrap();
    let node = build::convert(&catalog, c, Ty::Primitive(PrimitiveKind::F64)).unwrap();
    let lambda = build::lambda(vec![], node).unwrap();
    // An op_implicit and an op_explicit both reach f64; the truncating
    // explicit one must lose.
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::F64(21.5)));
}

#[test]
fn explicit_conversion_operator_needs_a_convert_node() {
    let catalog = celsius_catalog();
    let c = build::constant(celsius(36.6)).unwrap();
    assert!(matches!(
        build::coerce(&catalog, c.clone(), &int_ty()),
        Err(BuildError::NoConversion { .. })
    ));
    let cast = build::convert(&catalog, c, int_ty()).unwrap();
    let lambda = build::lambda(vec![], cast).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(36)));
}

#[test]
fn supplied_conversion_method_overrides_search() {
    let catalog = celsius_catalog();
    let method = catalog
        .get(TypeHash::from_name("Celsius"))
        .unwrap()
        .methods
        .iter()
        .find(|m| m.name == "kelvin")
        .cloned()
        .unwrap();
    let c = build::constant(celsius(20.0)).unwrap();
    // Resolution would pick op_implicit; the supplied method wins.
    let node = build::convert_with_method(
        &catalog,
        c.clone(),
        Ty::Primitive(PrimitiveKind::F64),
        method.clone(),
    )
    .unwrap();
    let lambda = build::lambda(vec![], node).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::F64(293.0)));

    // The supplied method must reach the declared target type.
    assert!(matches!(
        build::convert_with_method(&catalog, c, int_ty(), method),
        Err(BuildError::TypeMismatch { .. })
    ));
}

// === Methods, by-ref write-back, calls ===

#[test]
fn by_ref_argument_writes_back() {
    let mut catalog = Catalog::new();
    let bump: NativeFn = Rc::new(|_, args| {
        if let Value::I32(n) = &args[0] {
            args[0] = Value::I32(n + 1);
        }
        Ok(Value::Null)
    });
    let hash = catalog.register(StructEntry::new("Util", false).with_static_method(
        "bump",
        vec![ParamDef::by_ref(int_ty())],
        Ty::Void,
        bump,
    ));
    let catalog = Rc::new(catalog);

    let v = build::variable(int_ty(), "v").unwrap();
    let body = build::block(
        vec![v.clone()],
        vec![
            build::assign(&catalog, v.clone(), int(5)).unwrap(),
            build::call_static(&catalog, hash, "bump", vec![v.clone()]).unwrap(),
            v.clone(),
        ],
    )
    .unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(6)));
}

#[test]
fn by_ref_argument_must_be_writable() {
    let mut catalog = Catalog::new();
    let noop: NativeFn = Rc::new(|_, _| Ok(Value::Null));
    let hash = catalog.register(StructEntry::new("Util", false).with_static_method(
        "bump",
        vec![ParamDef::by_ref(int_ty())],
        Ty::Void,
        noop,
    ));
    assert!(matches!(
        build::call_static(&catalog, hash, "bump", vec![int(5)]),
        Err(BuildError::InvalidArgument { .. })
    ));
}

#[test]
fn instance_call_on_null_fails() {
    let mut catalog = Catalog::new();
    let name: NativeFn = Rc::new(|_, _| Ok(Value::str("pet")));
    let hash = catalog.register(StructEntry::new("Pet", false).with_method(
        "name",
        vec![],
        Ty::Str,
        name,
    ));
    let catalog = Rc::new(catalog);

    let p = build::parameter(Ty::Object(hash), "p").unwrap();
    let body = build::call(&catalog, p.clone(), "name", vec![]).unwrap();
    let lambda = build::lambda(vec![p], body).unwrap();
    assert_eq!(
        run_both(&catalog, &lambda, &[Value::Null]),
        Err(EvalError::NullReference { member: "name".into() })
    );
}

// === Construction and initialization ===

fn person_catalog() -> (Rc<Catalog>, TypeHash, TypeHash) {
    let mut catalog = Catalog::new();
    let address = catalog.register(StructEntry::new("Address", false).with_field("city", Ty::Str));
    let person = catalog.register(
        StructEntry::new("Person", false)
            .with_field("name", Ty::Str)
            .with_field("address", Ty::Object(address)),
    );
    (Rc::new(catalog), person, address)
}

#[test]
fn nested_member_initialization() {
    let (catalog, person, _) = person_catalog();
    let fresh = build::new_instance(&catalog, person, vec![]).unwrap();
    let init = build::member_init(
        &catalog,
        fresh,
        vec![
            build::bind(&catalog, person, "name", text("Ada")).unwrap(),
            build::bind_nested(
                &catalog,
                person,
                "address",
                vec![build::bind(
                    &catalog,
                    TypeHash::from_name("Address"),
                    "city",
                    text("Paris"),
                )
                .unwrap()],
            )
            .unwrap(),
        ],
    )
    .unwrap();
    let city = build::field(&catalog, build::field(&catalog, init, "address").unwrap(), "city")
        .unwrap();
    let lambda = build::lambda(vec![], city).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::str("Paris")));
}

#[test]
fn constructor_overloads_rank_by_cost() {
    let mut catalog = Catalog::new();
    let make_i32: NativeFn = Rc::new(|_, args| {
        let mut fields = rustc_hash::FxHashMap::default();
        fields.insert("w".to_string(), args[0].clone());
        Ok(Value::object(TypeHash::from_name("Boxy"), fields))
    });
    let make_f64: NativeFn = Rc::new(|_, args| {
        let mut fields = rustc_hash::FxHashMap::default();
        fields.insert("w".to_string(), args[0].clone());
        Ok(Value::object(TypeHash::from_name("Boxy"), fields))
    });
    let hash = catalog.register(
        StructEntry::new("Boxy", false)
            .with_field("w", Ty::Object(TypeHash::from_name("Object")))
            .with_ctor(vec![ParamDef::new(int_ty())], make_i32)
            .with_ctor(vec![ParamDef::new(Ty::Primitive(PrimitiveKind::F64))], make_f64),
    );
    let catalog = Rc::new(catalog);

    // An i32 argument matches the first constructor exactly.
    let node = build::new_instance(&catalog, hash, vec![int(7)]).unwrap();
    let field = build::field(&catalog, node, "w").unwrap();
    let lambda = build::lambda(vec![], field).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(7)));
}

#[test]
fn list_initialization_runs_adds_in_order() {
    let mut catalog = Catalog::new();
    let add: NativeFn = Rc::new(|instance, args| {
        let obj = instance.and_then(|v| v.as_obj().cloned()).unwrap();
        let mut data = obj.borrow_mut();
        let joined = match data.fields.get("items") {
            Some(Value::Str(s)) => format!("{}{:?},", s, args[0]),
            _ => format!("{:?},", args[0]),
        };
        data.fields.insert("items".to_string(), Value::str(&joined));
        Ok(Value::Null)
    });
    let hash = catalog.register(
        StructEntry::new("Bag", false)
            .with_field("items", Ty::Str)
            .with_method("add", vec![ParamDef::new(int_ty())], Ty::Void, add),
    );
    let catalog = Rc::new(catalog);

    let fresh = build::new_instance(&catalog, hash, vec![]).unwrap();
    let init = build::list_init(&catalog, fresh, vec![vec![int(1)], vec![int(2)]]).unwrap();
    let items = build::field(&catalog, init, "items").unwrap();
    let lambda = build::lambda(vec![], items).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::str("1,2,")));
}

#[test]
fn array_construction_and_length() {
    let catalog = Rc::new(Catalog::new());
    let array = build::new_array(&catalog, int_ty(), vec![int(1), int(2), int(3)]).unwrap();
    let body = build::array_length(&catalog, array).unwrap();
    let lambda = build::lambda(vec![], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(3)));
}

// === Runtime type tests, boxing ===

fn shapes_catalog() -> (Rc<Catalog>, TypeHash, TypeHash) {
    let mut catalog = Catalog::new();
    let shape = catalog.register(StructEntry::new("Shape", false));
    let circle = catalog.register(StructEntry::new("Circle", false).with_base(shape));
    (Rc::new(catalog), shape, circle)
}

#[test]
fn type_test_follows_the_runtime_type() {
    let (catalog, shape, circle) = shapes_catalog();
    let o = build::parameter(catalog.object_ty(), "o").unwrap();
    let body = build::type_is(&catalog, o.clone(), Ty::Object(circle)).unwrap();
    let lambda = build::lambda(vec![o], body).unwrap();

    let circle_value = Value::object(circle, rustc_hash::FxHashMap::default());
    let shape_value = Value::object(shape, rustc_hash::FxHashMap::default());
    assert_eq!(run_both(&catalog, &lambda, &[circle_value]), Ok(Value::Bool(true)));
    assert_eq!(run_both(&catalog, &lambda, &[shape_value]), Ok(Value::Bool(false)));
    assert_eq!(run_both(&catalog, &lambda, &[Value::Null]), Ok(Value::Bool(false)));
}

#[test]
fn type_as_yields_null_on_mismatch() {
    let (catalog, shape, circle) = shapes_catalog();
    let o = build::parameter(catalog.object_ty(), "o").unwrap();
    let body = build::type_as(&catalog, o.clone(), Ty::Object(circle)).unwrap();
    let lambda = build::lambda(vec![o], body).unwrap();

    let circle_value = Value::object(circle, rustc_hash::FxHashMap::default());
    let shape_value = Value::object(shape, rustc_hash::FxHashMap::default());
    assert_eq!(run_both(&catalog, &lambda, &[circle_value.clone()]), Ok(circle_value));
    assert_eq!(run_both(&catalog, &lambda, &[shape_value]), Ok(Value::Null));
}

#[test]
fn boxing_round_trips_through_the_root() {
    let catalog = Rc::new(Catalog::new());
    let boxed = build::convert(&catalog, int(42), catalog.object_ty()).unwrap();
    let back = build::convert(&catalog, boxed, int_ty()).unwrap();
    let lambda = build::lambda(vec![], back).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[]), Ok(Value::I32(42)));
}

#[test]
fn unboxing_to_the_wrong_type_fails() {
    let catalog = Rc::new(Catalog::new());
    let boxed = build::convert(&catalog, text("nope"), catalog.object_ty()).unwrap();
    let back = build::convert(&catalog, boxed, int_ty()).unwrap();
    let lambda = build::lambda(vec![], back).unwrap();
    assert_eq!(
        run_both(&catalog, &lambda, &[]),
        Err(EvalError::InvalidCast { from: "str".into(), to: "i32".into() })
    );
}

// === Delegates and closures ===

#[test]
fn nested_lambda_captures_by_reference() {
    let catalog = Rc::new(Catalog::new());
    let x = build::parameter(int_ty(), "x").unwrap();
    let y = build::parameter(int_ty(), "y").unwrap();
    let inner_body = build::add(&catalog, x.clone(), y.clone()).unwrap();
    let inner = build::lambda(vec![y], inner_body).unwrap();
    let body = build::invoke(&catalog, inner, vec![int(10)]).unwrap();
    let lambda = build::lambda(vec![x], body).unwrap();
    assert_eq!(run_both(&catalog, &lambda, &[Value::I32(3)]), Ok(Value::I32(13)));
}

#[test]
fn invoking_a_non_delegate_is_rejected_at_build_time() {
    let catalog = Rc::new(Catalog::new());
    assert!(matches!(
        build::invoke(&catalog, int(1), vec![]),
        Err(BuildError::NotADelegate { .. })
    ));
}

// === Builder validation ===

#[test]
fn readonly_field_rejects_assignment() {
    let mut catalog = Catalog::new();
    let hash =
        catalog.register(StructEntry::new("Frozen", false).with_readonly_field("id", Ty::Str));
    let catalog = Rc::new(catalog);
    let p = build::parameter(Ty::Object(hash), "p").unwrap();
    let member = build::field(&catalog, p, "id").unwrap();
    assert!(matches!(
        build::assign(&catalog, member, text("nope")),
        Err(BuildError::ReadOnlyMember { .. })
    ));
}

#[test]
fn unknown_member_is_reported() {
    let (catalog, person, _) = person_catalog();
    let p = build::parameter(Ty::Object(person), "p").unwrap();
    assert!(matches!(
        build::field(&catalog, p, "age"),
        Err(BuildError::UnknownMember { .. })
    ));
}

#[test]
fn member_lookup_falls_back_case_insensitively() {
    let (catalog, person, _) = person_catalog();
    let p = build::parameter(Ty::Object(person), "p").unwrap();
    let member = build::field(&catalog, p, "Name").unwrap();
    assert_eq!(member.ty, Ty::Str);
}

#[test]
fn assignment_through_a_value_type_member_is_rejected() {
    let mut catalog = Catalog::new();
    let size = catalog.register(StructEntry::new("Size", true).with_field("w", int_ty()));
    let holder =
        catalog.register(StructEntry::new("Holder", false).with_field("size", Ty::Object(size)));
    let catalog = Rc::new(catalog);

    let h = build::parameter(Ty::Object(holder), "h").unwrap();
    let size_field = build::field(&catalog, h.clone(), "size").unwrap();
    let width = build::field(&catalog, size_field.clone(), "w").unwrap();
    assert!(matches!(
        build::assign(&catalog, width, int(3)),
        Err(BuildError::InvalidOperation { .. })
    ));
    // Replacing the whole value-type field is a plain field write.
    let fresh = build::new_instance(&catalog, size, vec![]).unwrap();
    assert!(build::assign(&catalog, size_field, fresh).is_ok());
}

#[test]
fn null_constant_rejected_for_value_types() {
    let catalog = Catalog::new();
    assert!(matches!(
        build::constant_of(&catalog, Value::Null, int_ty()),
        Err(BuildError::TypeMismatch { .. })
    ));
}

// === Depth guard ===

#[test]
fn deep_recursion_is_reported_not_crashed() {
    let catalog = Rc::new(Catalog::new());
    let mut node = int(0);
    for _ in 0..64 {
        node = build::add(&catalog, node, int(1)).unwrap();
    }
    let interp = Interpreter::with_max_depth(catalog, 16);
    let scope = Scope::root();
    assert_eq!(
        interp.eval(&node, &scope),
        Err(EvalError::StackOverflow { max_depth: 16 })
    );
}

#[test]
fn both_modes_reject_overdeep_trees_identically() {
    let catalog = Rc::new(Catalog::new());
    let mut node = int(0);
    for _ in 0..600 {
        node = build::add(&catalog, node, int(1)).unwrap();
    }
    let lambda = build::lambda(vec![], node).unwrap();
    // run_both already asserts the two modes agree on the failure.
    let result = run_both(&catalog, &lambda, &[]);
    assert!(matches!(result, Err(EvalError::StackOverflow { .. })));
}
