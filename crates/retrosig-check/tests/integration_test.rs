//! End-to-end tests: declare, define, call.
//!
//! Every test builds a fresh `Runtime`, so nothing leaks between tests.
//! Methods are realised lazily unless a test calls `run_all_sig_blocks`.

use std::sync::{Arc, Mutex};

use retrosig_check::{
    CallValidationError, CheckLevel, Configuration, Mode, Returns, Runtime, RuntimeError, ValidationKind,
};
use retrosig_core::params::Parameter;
use retrosig_core::types;
use retrosig_core::{ClassId, MethodKey, Value};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// `add(a: Integer, b: Integer) -> Integer` on `Object`.
fn define_add(rt: &Runtime) -> MethodKey {
    rt.sig(ClassId::OBJECT, |s| {
        s.params([("a", types::integer()), ("b", types::integer())])?
            .returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(
        ClassId::OBJECT,
        "add",
        vec![Parameter::req("a"), Parameter::req("b")],
        |_rt, inv| {
            let sum = inv.args.iter().filter_map(Value::as_integer).sum();
            Ok(Value::Integer(sum))
        },
    )
    .unwrap()
}

fn validation(err: &RuntimeError) -> &CallValidationError {
    err.as_call_validation()
        .unwrap_or_else(|| panic!("expected a call validation error, got {err:?}"))
}

/// Collects `(message, fields)` pairs passed to the log-info handler.
fn capturing_log() -> (Configuration, Arc<Mutex<Vec<(String, serde_json::Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = Configuration::new().with_log_info_handler(move |msg, extra| {
        sink.lock().unwrap().push((msg.to_string(), extra.clone()));
    });
    (config, seen)
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn round_trip_accepts_and_rejects() {
    init_tracing();
    let rt = Runtime::default();
    define_add(&rt);

    let ok = rt.call(&Value::Nil, "add", &[Value::Integer(1), Value::Integer(2)]).unwrap();
    assert_eq!(ok.as_integer(), Some(3));

    let err = rt
        .call(&Value::Nil, "add", &[Value::Integer(1), Value::str("x")])
        .unwrap_err();
    let v = validation(&err);
    assert_eq!(v.kind, ValidationKind::Parameter);
    assert_eq!(v.name.as_deref(), Some("b"));
    assert_eq!(v.expected, "Integer");
    assert!(v.message.starts_with("Expected type Integer, got type String"), "{}", v.message);
    assert!(v.pretty_message.starts_with("Parameter 'b': Expected type Integer"));
    assert!(v.caller.file.ends_with("integration_test.rs"), "{}", v.caller);
}

#[test]
fn wrong_arity_is_an_argument_error() {
    let rt = Runtime::default();
    define_add(&rt);
    let err = rt.call(&Value::Nil, "add", &[Value::Integer(1)]).unwrap_err();
    assert_eq!(err.to_string(), "wrong number of arguments (given 1, expected 2)");
}

#[test]
fn return_value_is_checked() {
    let rt = Runtime::default();
    rt.sig(ClassId::OBJECT, |s| {
        s.returns(types::string())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "name", vec![], |_rt, _inv| Ok(Value::Integer(5)))
        .unwrap();

    let err = rt.call(&Value::Nil, "name", &[]).unwrap_err();
    let v = validation(&err);
    assert_eq!(v.kind, ValidationKind::ReturnValue);
    assert_eq!(v.name, None);
    insta::assert_snapshot!(v.message, @"Expected type String, got type Integer with value 5");
}

#[test]
fn keywords_rest_and_block_go_through_the_slow_path() {
    let rt = Runtime::default();
    rt.sig(ClassId::OBJECT, |s| {
        s.params([
            ("head", types::integer()),
            ("tail", types::integer()),
            ("label", types::string()),
            ("blk", types::nilable(types::proc_type())),
        ])?
        .returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(
        ClassId::OBJECT,
        "tally",
        vec![
            Parameter::req("head"),
            Parameter::rest("tail"),
            Parameter::key("label"),
            Parameter::block("blk"),
        ],
        |_rt, inv| Ok(Value::Integer(inv.args.len() as i64)),
    )
    .unwrap();

    let kwargs = Value::kwargs([("label", Value::str("total"))]);
    let out = rt
        .call(&Value::Nil, "tally", &[Value::Integer(1), Value::Integer(2), kwargs])
        .unwrap();
    assert_eq!(out.as_integer(), Some(3));

    let err = rt
        .call(&Value::Nil, "tally", &[Value::Integer(1), Value::Integer(2), Value::str("three")])
        .unwrap_err();
    assert_eq!(validation(&err).name.as_deref(), Some("tail"));

    let bad_kw = Value::kwargs([("label", Value::Integer(9))]);
    let err = rt.call(&Value::Nil, "tally", &[Value::Integer(1), bad_kw]).unwrap_err();
    assert_eq!(validation(&err).name.as_deref(), Some("label"));

    let err = rt
        .call_with_block(&Value::Nil, "tally", &[Value::Integer(1)], &Value::Integer(0))
        .unwrap_err();
    assert_eq!(validation(&err).kind, ValidationKind::BlockParameter);

    let err = rt.call(&Value::Nil, "tally", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::ArgumentCount { given: 0, .. }));
}

// ---------------------------------------------------------------------------
// Void
// ---------------------------------------------------------------------------

#[test]
fn void_discards_the_real_return_value() {
    let rt = Runtime::default();
    let widget = rt.classes().define_class("Widget", None).unwrap();
    for (name, params) in [("fast", vec![Parameter::req("x")]), ("slow", vec![Parameter::opt("x")])] {
        rt.sig(ClassId::OBJECT, |s| {
            s.params([("x", types::integer())])?.void()?;
            Ok(())
        })
        .unwrap();
        rt.define_method(ClassId::OBJECT, name, params, move |_rt, _inv| Ok(Value::object(widget)))
            .unwrap();
    }

    for name in ["fast", "slow"] {
        for _ in 0..3 {
            let out = rt.call(&Value::Nil, name, &[Value::Integer(1)]).unwrap();
            assert!(matches!(out, Value::Void), "{name} returned {out:?}");
        }
    }
}

// ---------------------------------------------------------------------------
// Abstract
// ---------------------------------------------------------------------------

#[test]
fn abstract_without_implementation_raises() {
    let rt = Runtime::default();
    let shape = rt.classes().define_module("Shape").unwrap();
    let square = rt.classes().define_class("Square", None).unwrap();
    rt.classes().include(square, shape).unwrap();

    rt.sig(shape, |s| {
        s.r#abstract()?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(shape, "area", vec![], |_rt, _inv| Ok(Value::Nil)).unwrap();

    let err = rt.call(&Value::object(square), "area", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::AbstractNotImplemented { .. }));
    insta::assert_snapshot!(
        err.to_string(),
        @"The method `area` on Shape is declared as `abstract`. It does not have an implementation."
    );
}

#[test]
fn abstract_forwards_to_the_next_implementation() {
    let rt = Runtime::default();
    let base = rt.classes().define_class("Base", None).unwrap();
    let shape = rt.classes().define_module("Shape").unwrap();
    let square = rt.classes().define_class("Square", Some(base)).unwrap();
    rt.classes().include(square, shape).unwrap();

    rt.sig(shape, |s| {
        s.r#abstract()?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(shape, "area", vec![], |_rt, _inv| Ok(Value::Nil)).unwrap();
    rt.define_method(base, "area", vec![], |_rt, _inv| Ok(Value::Integer(16)))
        .unwrap();

    // First call goes through the lazy wrapper, second through the stub.
    for _ in 0..2 {
        let out = rt.call(&Value::object(square), "area", &[]).unwrap();
        assert_eq!(out.as_integer(), Some(16));
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

fn parent_and_child(rt: &Runtime, parent_overridable: bool) -> Result<(), RuntimeError> {
    let parent = rt.classes().define_class("Parent", None).unwrap();
    let child = rt.classes().define_class("Child", Some(parent)).unwrap();
    rt.sig(parent, move |s| {
        if parent_overridable {
            s.overridable()?;
        }
        s.returns(types::integer())?;
        Ok(())
    })?;
    rt.define_method(parent, "size", vec![], |_rt, _inv| Ok(Value::Integer(1)))?;
    rt.sig(child, |s| {
        s.r#override()?.returns(types::integer())?;
        Ok(())
    })?;
    rt.define_method(child, "size", vec![], |_rt, _inv| Ok(Value::Integer(2)))?;
    rt.run_all_sig_blocks()
}

#[test]
fn override_of_standard_method_fails() {
    let rt = Runtime::default();
    let err = parent_and_child(&rt, false).unwrap_err();
    assert!(matches!(err, RuntimeError::Override(_)), "{err:?}");
    assert!(err.to_string().contains("is not declared as `overridable`"), "{err}");
}

#[test]
fn override_of_overridable_method_succeeds() {
    let rt = Runtime::default();
    parent_and_child(&rt, true).unwrap();
}

#[test]
fn incompatible_override_reports_variance() {
    let rt = Runtime::default();
    let parent = rt.classes().define_class("Parent", None).unwrap();
    let child = rt.classes().define_class("Child", Some(parent)).unwrap();
    rt.sig(parent, |s| {
        s.overridable()?.params([("x", types::numeric())])?.returns(types::numeric())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(parent, "scale", vec![Parameter::req("x")], |_rt, _inv| Ok(Value::Integer(1)))
        .unwrap();
    rt.sig(child, |s| {
        s.r#override()?.params([("x", types::integer())])?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(child, "scale", vec![Parameter::req("x")], |_rt, _inv| Ok(Value::Integer(2)))
        .unwrap();

    let err = rt.call(&Value::object(child), "scale", &[Value::Integer(3)]).unwrap_err();
    assert!(matches!(err, RuntimeError::Override(retrosig_check::OverrideError::TypeVariance { .. })), "{err:?}");
}

#[test]
fn untyped_parent_with_unsupported_shape_skips_override_checks() {
    let rt = Runtime::default();
    let parent = rt.classes().define_class("Legacy", None).unwrap();
    let child = rt.classes().define_class("Modern", Some(parent)).unwrap();
    rt.define_method(
        parent,
        "fetch",
        vec![Parameter::opt("a"), Parameter::req("b")],
        |_rt, _inv| Ok(Value::Nil),
    )
    .unwrap();
    rt.sig(child, |s| {
        s.params([("a", types::integer())])?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(child, "fetch", vec![Parameter::req("a")], |_rt, _inv| Ok(Value::Integer(0)))
        .unwrap();

    rt.run_all_sig_blocks().unwrap();
    let sig = rt.signature_for_method(child, "fetch").unwrap().unwrap();
    assert_eq!(sig.mode, Mode::Standard);
}

#[test]
fn sig_validation_handler_can_downgrade_to_untyped() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = Configuration::new().with_sig_validation_handler(move |err, ctx| {
        sink.lock().unwrap().push((err.to_string(), ctx.method.to_string(), ctx.super_signature.is_some()));
        Ok(())
    });
    let rt = Runtime::new(config);
    parent_and_child(&rt, false).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "Child#size");
    assert!(seen[0].2);
    let child = rt.classes().get_by_name("Child").unwrap();
    let sig = rt.signature_for_method(child, "size").unwrap().unwrap();
    assert_eq!(sig.mode, Mode::Untyped);
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

#[test]
fn missing_and_extra_names_are_shape_errors() {
    let rt = Runtime::default();
    rt.sig(ClassId::OBJECT, |s| {
        s.params([("a", types::integer())])?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(
        ClassId::OBJECT,
        "two",
        vec![Parameter::req("a"), Parameter::req("b")],
        |_rt, _inv| Ok(Value::Integer(0)),
    )
    .unwrap();
    let err = rt.call(&Value::Nil, "two", &[Value::Integer(1), Value::Integer(2)]).unwrap_err();
    assert!(matches!(err, RuntimeError::Shape(_)), "{err:?}");
    assert!(err.to_string().contains("missing parameter(s): b"), "{err}");

    rt.sig(ClassId::OBJECT, |s| {
        s.params([("a", types::integer()), ("z", types::integer())])?
            .returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "one", vec![Parameter::req("a")], |_rt, _inv| {
        Ok(Value::Integer(0))
    })
    .unwrap();
    let err = rt.call(&Value::Nil, "one", &[Value::Integer(1)]).unwrap_err();
    assert!(err.to_string().contains("extra parameter(s): z"), "{err}");
}

// ---------------------------------------------------------------------------
// Check levels, soft and generated
// ---------------------------------------------------------------------------

#[test]
fn tests_level_follows_the_flag_on_every_call() {
    let rt = Runtime::default();
    rt.sig(ClassId::OBJECT, |s| {
        s.params([("x", types::integer())])?
            .returns(types::integer())?
            .checked(CheckLevel::Tests)?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "echo", vec![Parameter::req("x")], |_rt, inv| {
        Ok(inv.args[0].clone())
    })
    .unwrap();

    assert!(rt.call(&Value::Nil, "echo", &[Value::str("x")]).is_ok());
    rt.enable_checking_in_tests();
    assert!(rt.call(&Value::Nil, "echo", &[Value::str("x")]).is_err());
    rt.disable_checking_in_tests();
    assert!(rt.call(&Value::Nil, "echo", &[Value::str("x")]).is_ok());
}

#[test]
fn never_level_installs_the_original() {
    let rt = Runtime::default();
    rt.sig(ClassId::OBJECT, |s| {
        s.returns(types::integer())?.checked(CheckLevel::Never)?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "loose", vec![], |_rt, _inv| Ok(Value::str("not an int")))
        .unwrap();
    for _ in 0..2 {
        assert_eq!(rt.call(&Value::Nil, "loose", &[]).unwrap().as_str(), Some("not an int"));
    }
}

#[test]
fn sig_raw_is_recorded_but_not_enforced() {
    let rt = Runtime::default();
    rt.sig_raw(ClassId::OBJECT, |s| {
        s.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    let key = rt
        .define_method(ClassId::OBJECT, "raw", vec![], |_rt, _inv| Ok(Value::Nil))
        .unwrap();
    assert!(rt.call(&Value::Nil, "raw", &[]).is_ok());
    assert!(rt.signature_for(&key).unwrap().unwrap().defined_raw);
}

#[test]
fn soft_failures_notify_and_continue() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = Configuration::new()
        .with_soft_assert_handler(move |msg, notify| sink.lock().unwrap().push((msg.to_string(), notify.to_string())));
    let rt = Runtime::new(config);
    rt.sig(ClassId::OBJECT, |s| {
        s.soft("payments")?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "total", vec![], |_rt, _inv| Ok(Value::Nil))
        .unwrap();

    assert!(rt.call(&Value::Nil, "total", &[]).unwrap().is_nil());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "payments");
    assert!(seen[0].0.starts_with("Return value: Expected type Integer, got type NilClass"));
}

#[test]
fn generated_check_failures_log_once() {
    let (config, seen) = capturing_log();
    let rt = Runtime::new(config);
    rt.sig(ClassId::OBJECT, |s| {
        s.generated()?.returns(types::symbol())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "kind", vec![], |_rt, _inv| Ok(Value::Integer(1)))
        .unwrap();

    assert_eq!(rt.call(&Value::Nil, "kind", &[]).unwrap().as_integer(), Some(1));
    assert_eq!(rt.call(&Value::Nil, "kind", &[]).unwrap().as_integer(), Some(1));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "SIG-CHECK-FAILED");
    assert_eq!(seen[0].1["method"], "Object#kind");
}

#[test]
fn malformed_generated_signature_logs_declare_failure() {
    let (config, seen) = capturing_log();
    let rt = Runtime::new(config);
    rt.sig(ClassId::OBJECT, |s| {
        s.generated()?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(ClassId::OBJECT, "foo", vec![Parameter::req("foo")], |_rt, _inv| {
        Ok(Value::Integer(1))
    })
    .unwrap();

    assert!(rt.call(&Value::Nil, "foo", &[Value::Integer(2)]).is_ok());
    assert!(rt.call(&Value::Nil, "foo", &[Value::Integer(2)]).is_ok());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "SIG-DECLARE-FAILED");
}

#[test]
fn overriding_a_generated_parent_only_logs() {
    let (config, seen) = capturing_log();
    let rt = Runtime::new(config);
    let parent = rt.classes().define_class("Parent", None).unwrap();
    let child = rt.classes().define_class("Child", Some(parent)).unwrap();
    rt.sig(parent, |s| {
        s.generated()?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(parent, "foo", vec![], |_rt, _inv| Ok(Value::Integer(1)))
        .unwrap();
    rt.sig(child, |s| {
        s.returns(types::string())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(child, "foo", vec![], |_rt, _inv| Ok(Value::str("1"))).unwrap();

    assert_eq!(rt.call(&Value::object(child), "foo", &[]).unwrap().as_str(), Some("1"));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "SIG-DECLARE-FAILED");
}

#[test]
fn log_and_continue_downgrades_call_failures() {
    init_tracing();
    let handler = retrosig_check::config::log_and_continue();
    let rt = Runtime::new(Configuration::new().with_call_validation_handler(move |e| handler(e)));
    define_add(&rt);
    let out = rt
        .call(&Value::Nil, "add", &[Value::Integer(1), Value::Float(2.5)])
        .unwrap();
    assert_eq!(out.as_integer(), Some(1));
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn signature_for_realises_pending_declarations() {
    let rt = Runtime::default();
    let key = define_add(&rt);
    assert!(rt.registry().has_pending(&key));
    let sig = rt.signature_for(&key).unwrap().unwrap();
    assert_eq!(sig.arg_count(), 2);
    assert!(matches!(sig.returns, Returns::Type(_)));
    assert!(!rt.registry().has_pending(&key));
}

#[test]
fn forwarder_shape_is_checked_against_overrides() {
    let rt = Runtime::default();
    let parent = rt.classes().define_class("Delegator", None).unwrap();
    let child = rt.classes().define_class("Narrow", Some(parent)).unwrap();
    let target = define_add(&rt);
    let from = rt
        .define_method(
            parent,
            "run",
            vec![Parameter::rest("args"), Parameter::block("blk")],
            |rt, inv| rt.call(inv.receiver, "add", inv.args),
        )
        .unwrap();
    rt.register_forwarder(&from, &target, Mode::Overridable, false).unwrap();

    rt.sig(child, |s| {
        s.r#override()?.params([("a", types::integer())])?.returns(types::integer())?;
        Ok(())
    })
    .unwrap();
    rt.define_method(child, "run", vec![Parameter::req("a")], |_rt, _inv| Ok(Value::Integer(0)))
        .unwrap();

    let err = rt.run_all_sig_blocks().unwrap_err();
    assert!(matches!(err, RuntimeError::Override(retrosig_check::OverrideError::Shape { .. })), "{err:?}");
}
