use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{RuntimeError, TypeErrorKind};
use crate::ffi::{HostMap, HostValue};
use crate::interpreter::Interpreter;
use crate::runtime::{Arity, Deferred, NativeFunction, Value};

/// Functions every interpreter starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Str,
    Len,
    Sleep,
}

impl BuiltinFunction {
    pub const ALL: [Self; 3] = [Self::Str, Self::Len, Self::Sleep];

    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Len => "len",
            Self::Sleep => "sleep",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    fn call(self, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        let argument = arguments.into_iter().next().unwrap_or(Value::None);
        match self {
            Self::Str => Ok(Value::str(argument.to_string())),
            Self::Len => match argument.as_indexable() {
                Some(indexable) => Ok(Value::Number(indexable.len() as f64)),
                None => Err(TypeErrorKind::NoLen.into()),
            },
            Self::Sleep => {
                let millis = expect_number(self.name(), &argument)?;
                let duration = Duration::from_millis(millis.max(0.0) as u64);
                let deferred = Deferred::spawn(async move {
                    tokio::time::sleep(duration).await;
                    Ok(Value::None)
                });
                Ok(Value::Deferred(deferred))
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Callable(NativeFunction::new(
            self.name(),
            Arity::Exact(1),
            move |_, arguments| self.call(arguments),
        ))
    }
}

fn expect_number(function: &str, value: &Value) -> Result<f64, RuntimeError> {
    value.as_number().ok_or_else(|| {
        TypeErrorKind::ExpectedNumber {
            function: function.to_string(),
            got: value.type_name().to_string(),
        }
        .into()
    })
}

/// Seeds `interpreter` with the builtin functions and the `random` and
/// `math` host objects.
/// The name `for` loops call to measure their iterable. Source code cannot
/// spell it, so rebinding `len` leaves loops alone.
pub const LOOP_LEN: &str = "$len";

pub fn install(interpreter: &Interpreter) {
    for builtin in BuiltinFunction::ALL {
        interpreter.register(builtin.name(), builtin.into_value());
    }
    interpreter.register(LOOP_LEN, BuiltinFunction::Len.into_value());
    interpreter.register_host("random", HostValue::Object(random()));
    interpreter.register_host("math", HostValue::Object(math()));
}

fn random() -> Rc<HostMap> {
    HostMap::builder()
        .function("randrange", 2, |_, arguments| {
            let start = HostValue::number_arg("randrange", &arguments, 0)?.ceil();
            let stop = HostValue::number_arg("randrange", &arguments, 1)?.floor();
            if start > stop {
                return Err(format!("empty range for randrange({start}, {stop})"));
            }
            let value = rand::thread_rng().gen_range(start as i64..=stop as i64);
            Ok(HostValue::Number(value as f64))
        })
        .build()
}

fn math() -> Rc<HostMap> {
    let unary = |name: &'static str, operation: fn(f64) -> f64| {
        move |_: &HostValue, arguments: Vec<HostValue>| -> Result<HostValue, String> {
            let value = HostValue::number_arg(name, &arguments, 0)?;
            Ok(HostValue::Number(operation(value)))
        }
    };
    HostMap::builder()
        .function("ceil", 1, unary("ceil", f64::ceil))
        .function("floor", 1, unary("floor", f64::floor))
        .function("sqrt", 1, unary("sqrt", f64::sqrt))
        .function("abs", 1, unary("abs", f64::abs))
        .build()
}

/// A variadic `print` that hands each rendered line to `sink`.
pub fn print(sink: impl Fn(String) + 'static) -> Rc<NativeFunction> {
    NativeFunction::new("print", Arity::Variadic, move |_, arguments| {
        let line = arguments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        sink(line);
        Ok(Value::None)
    })
}

/// Whole seconds since the Unix epoch.
pub fn clock() -> Rc<NativeFunction> {
    NativeFunction::new("clock", Arity::Exact(0), |_, _| {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Ok(Value::Number(seconds as f64))
    })
}

/// A host object whose `log(...)` joins its arguments like `print`.
pub fn console(sink: impl Fn(String) + 'static) -> HostValue {
    let object = HostMap::builder()
        .function("log", 0, move |_, arguments| {
            let line = arguments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            sink(line);
            Ok(HostValue::None)
        })
        .build();
    HostValue::Object(object)
}
