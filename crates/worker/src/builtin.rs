//! 内置示例服务

use serde::{Deserialize, Serialize};

use choreo_core::{ChoreoError, ChoreoResult};

use crate::catalog::ServiceCatalog;
use crate::descriptor::ClassDescriptor;
use crate::instance::WrapperDescriptor;
use crate::marshalling::{SEQUENCE, VECTOR};
use crate::values::{NativeType, NativeValue};

pub const COUNTER: &str = "demo.Counter";
pub const ACCUMULATOR: &str = "demo.Accumulator";
pub const CALCULATOR: &str = "demo.Calculator";
pub const SCALER: &str = "demo.Scaler";
pub const SCALER_WRAPPER: &str = "demo.ScalerWrapper";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub value: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub values: Vec<f64>,
}

impl Accumulator {
    fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

#[derive(Debug, Default)]
pub struct Calculator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub factor: f64,
}

fn vector(value: &NativeValue) -> ChoreoResult<&Vec<f64>> {
    value.as_object::<Vec<f64>>()
}

fn counter() -> ClassDescriptor {
    ClassDescriptor::builder::<Counter>(COUNTER)
        // 形参较多的构造器必须先声明，否则 `()` 会吞掉所有调用
        .constructor(vec![NativeType::Int], |args| {
            Ok(Counter {
                value: args[0].as_int()?,
            })
        })
        .constructor(vec![], |_| Ok(Counter::default()))
        .method("add", vec![NativeType::Int], |c, args| {
            c.value = c
                .value
                .checked_add(args[0].as_int()?)
                .ok_or_else(|| ChoreoError::invocation("计数器溢出"))?;
            Ok(NativeValue::Int(c.value))
        })
        .method("get", vec![], |c, _| Ok(NativeValue::Int(c.value)))
        .method("reset", vec![], |c, _| {
            c.value = 0;
            Ok(NativeValue::Null)
        })
        .persist_with_serde()
        .build()
}

fn accumulator() -> ClassDescriptor {
    ClassDescriptor::builder::<Accumulator>(ACCUMULATOR)
        .constructor(vec![], |_| Ok(Accumulator::default()))
        .method("push", vec![NativeType::Double], |acc, args| {
            acc.values.push(args[0].as_double()?);
            Ok(NativeValue::Int(acc.values.len() as i64))
        })
        .method("sum", vec![], |acc, _| Ok(NativeValue::Double(acc.sum())))
        .method("mean", vec![], |acc, _| {
            if acc.values.is_empty() {
                return Err(ChoreoError::invocation("空序列没有均值"));
            }
            Ok(NativeValue::Double(acc.sum() / acc.values.len() as f64))
        })
        .persist_with_serde()
        .build()
}

fn calculator() -> ClassDescriptor {
    ClassDescriptor::builder::<Calculator>(CALCULATOR)
        .constructor(vec![], |_| Ok(Calculator))
        .method(
            "scale",
            vec![NativeType::object(VECTOR), NativeType::Double],
            |_, args| {
                let factor = args[1].as_double()?;
                let scaled: Vec<f64> = vector(&args[0])?.iter().map(|x| x * factor).collect();
                Ok(NativeValue::object(VECTOR, scaled))
            },
        )
        // 返回原向量的长度，并把参数改写为单位向量
        .method("normalize", vec![NativeType::object(VECTOR)], |_, args| {
            let items = vector(&args[0])?;
            let norm = items.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                return Err(ChoreoError::invocation("零向量无法归一化"));
            }
            let unit: Vec<f64> = items.iter().map(|x| x / norm).collect();
            args[0] = NativeValue::object(VECTOR, unit);
            Ok(NativeValue::Double(norm))
        })
        .method("describe", vec![NativeType::object(SEQUENCE)], |_, args| {
            Ok(NativeValue::Str(format!("sequence of {}", vector(&args[0])?.len())))
        })
        .method("describe", vec![NativeType::object(VECTOR)], |_, args| {
            Ok(NativeValue::Str(format!("vector of {}", vector(&args[0])?.len())))
        })
        .build()
}

fn scaler() -> ClassDescriptor {
    ClassDescriptor::builder::<Scaler>(SCALER)
        .constructor(vec![NativeType::Double], |args| {
            Ok(Scaler {
                factor: args[0].as_double()?,
            })
        })
        .method("apply", vec![NativeType::object(VECTOR)], |s, args| {
            let scaled: Vec<f64> = vector(&args[0])?.iter().map(|x| x * s.factor).collect();
            Ok(NativeValue::object(VECTOR, scaled))
        })
        .method("factor", vec![], |s, _| Ok(NativeValue::Double(s.factor)))
        .persist_with_serde()
        .build()
}

fn scaler_wrapper() -> WrapperDescriptor {
    WrapperDescriptor::new(SCALER_WRAPPER)
        .prepare(|args| {
            if let Some(NativeValue::Double(factor)) = args.first_mut() {
                if *factor <= 0.0 {
                    *factor = 1.0;
                }
            }
        })
        .method("apply", vec![NativeType::object(VECTOR)], |delegate, args| {
            let scaler = delegate
                .state::<Scaler>()
                .ok_or_else(|| ChoreoError::Internal("包装器的被包装实例不是 Scaler".to_string()))?;
            let rounded: Vec<f64> = vector(&args[0])?
                .iter()
                .map(|x| (x * scaler.factor * 1000.0).round() / 1000.0)
                .collect();
            Ok(NativeValue::object(VECTOR, rounded))
        })
        .method("describe", vec![], |delegate, _| {
            let scaler = delegate
                .state::<Scaler>()
                .ok_or_else(|| ChoreoError::Internal("包装器的被包装实例不是 Scaler".to_string()))?;
            Ok(NativeValue::Str(format!("scaler x{}", scaler.factor)))
        })
}

/// 示例类目录，二进制和测试共用
pub fn builtin_catalog() -> ServiceCatalog {
    let mut catalog = ServiceCatalog::new();
    catalog
        .register_class(counter())
        .register_class(accumulator())
        .register_class(calculator())
        .register_class(scaler())
        .register_wrapper(scaler_wrapper());
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Invocable, ServiceInstance, WrappedService};
    use crate::marshalling::SemanticTypeMarshaller;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_catalog_contents() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.class_names(), vec![ACCUMULATOR, CALCULATOR, COUNTER, SCALER]);
        assert!(catalog.wrapper(SCALER_WRAPPER).is_some());
        assert!(!catalog.class(CALCULATOR).unwrap().is_persistable());
        assert!(catalog.class(COUNTER).unwrap().is_persistable());
    }

    #[test]
    fn test_counter_constructor_keeps_initial_value() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let class = builtin_catalog().class(COUNTER).unwrap();

        let ctor = class.resolve_constructor(&tags(&["Int"]), &marshaller).unwrap();
        assert_eq!(ctor.params(), &[NativeType::Int]);
        let mut args = vec![NativeValue::Int(7)];
        let mut counter = ServiceInstance::construct(class.clone(), ctor, &mut args).unwrap();

        let get = counter.resolve_method("get", &[], &marshaller).unwrap();
        assert_eq!(counter.invoke(&get, &mut []).unwrap(), NativeValue::Int(7));

        let ctor = class.resolve_constructor(&[], &marshaller).unwrap();
        let mut counter = ServiceInstance::construct(class.clone(), ctor, &mut []).unwrap();
        assert_eq!(counter.invoke(&get, &mut []).unwrap(), NativeValue::Int(0));
    }

    #[test]
    fn test_describe_overloads_pin_declaration_order() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let class = builtin_catalog().class(CALCULATOR).unwrap();
        let ctor = class.resolve_constructor(&[], &marshaller).unwrap();
        let mut calc = ServiceInstance::construct(class.clone(), ctor, &mut []).unwrap();

        let method = calc.resolve_method("describe", &tags(&[VECTOR]), &marshaller).unwrap();
        assert_eq!(method.params, vec![NativeType::object(SEQUENCE)]);

        let mut args = vec![NativeValue::object(VECTOR, vec![1.0, 2.0, 3.0])];
        let result = calc.invoke(&method, &mut args).unwrap();
        assert_eq!(result, NativeValue::Str("sequence of 3".into()));
    }

    #[test]
    fn test_normalize_rewrites_argument() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let class = builtin_catalog().class(CALCULATOR).unwrap();
        let mut calc = ServiceInstance::construct(class.clone(), &class.constructors()[0], &mut []).unwrap();

        let method = calc.resolve_method("normalize", &tags(&[VECTOR]), &marshaller).unwrap();
        let mut args = vec![NativeValue::object(VECTOR, vec![3.0, 4.0])];
        let norm = calc.invoke(&method, &mut args).unwrap();

        assert_eq!(norm, NativeValue::Double(5.0));
        assert_eq!(vector(&args[0]).unwrap(), &vec![0.6, 0.8]);
    }

    #[test]
    fn test_scaler_wrapper_prepare_and_override() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let catalog = builtin_catalog();
        let class = catalog.class(SCALER).unwrap();
        let wrapper = catalog.wrapper(SCALER_WRAPPER).unwrap();
        let ctor = class.resolve_constructor(&tags(&["Double"]), &marshaller).unwrap();

        let mut args = vec![NativeValue::Double(-2.0)];
        let mut scaler = WrappedService::build(wrapper, class.clone(), ctor, &mut args).unwrap();

        let factor = scaler.resolve_method("factor", &[], &marshaller).unwrap();
        assert_eq!(scaler.invoke(&factor, &mut []).unwrap(), NativeValue::Double(1.0));

        let describe = scaler.resolve_method("describe", &[], &marshaller).unwrap();
        assert_eq!(
            scaler.invoke(&describe, &mut []).unwrap(),
            NativeValue::Str("scaler x1".into())
        );

        let apply = scaler.resolve_method("apply", &tags(&[VECTOR]), &marshaller).unwrap();
        let mut args = vec![NativeValue::object(VECTOR, vec![1.0 / 3.0])];
        let result = scaler.invoke(&apply, &mut args).unwrap();
        assert_eq!(vector(&result).unwrap(), &vec![0.333]);
    }

    #[test]
    fn test_mean_of_empty_fails() {
        let marshaller = SemanticTypeMarshaller::new();
        let class = builtin_catalog().class(ACCUMULATOR).unwrap();
        let mut acc = ServiceInstance::construct(class.clone(), &class.constructors()[0], &mut []).unwrap();
        let mean = acc.resolve_method("mean", &[], &marshaller).unwrap();
        assert!(acc.invoke(&mean, &mut []).is_err());
    }
}
