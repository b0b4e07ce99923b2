use std::sync::Arc;

use async_trait::async_trait;
use choreo_core::{ChoreoError, ChoreoResult, ClassConfig, ClassesConfiguration};
use choreo_domain::{DurableStore, StoreKey, TaggedValue};
use choreo_infrastructure::InMemoryStore;
use choreo_worker::builtin::{ACCUMULATOR, CALCULATOR, COUNTER, SCALER, SCALER_WRAPPER};
use choreo_worker::{builtin_catalog, NativeValue, SemanticTypeMarshaller, ServiceRegistry};
use serde_json::json;

const HOST: &str = "127.0.0.1:8000";

fn classes() -> ClassesConfiguration {
    let mut classes = ClassesConfiguration::default();
    for (class, methods) in [
        (COUNTER, vec!["add", "get", "reset"]),
        (ACCUMULATOR, vec!["push", "sum", "mean"]),
        (CALCULATOR, vec!["scale", "normalize", "describe"]),
    ] {
        let mut config = ClassConfig::default();
        for method in methods {
            config.methods.insert(method.to_string(), Default::default());
        }
        classes.insert(class, config);
    }
    let mut scaler = ClassConfig {
        wrapper: Some(SCALER_WRAPPER.to_string()),
        ..Default::default()
    };
    for method in ["apply", "factor", "describe"] {
        scaler.methods.insert(method.to_string(), Default::default());
    }
    classes.insert(SCALER, scaler);
    classes
}

fn registry_with(store: Arc<dyn DurableStore>) -> ServiceRegistry {
    ServiceRegistry::new(
        Arc::new(classes()),
        Arc::new(builtin_catalog()),
        Arc::new(SemanticTypeMarshaller::with_builtin_types()),
        store,
    )
    .unwrap()
}

fn types(registry: &ServiceRegistry, values: &[TaggedValue]) -> Vec<String> {
    registry.promote_all(values)
}

/// 永远写入失败的存储
struct BrokenStore;

#[async_trait]
impl DurableStore for BrokenStore {
    async fn write(&self, key: &StoreKey, _bytes: Vec<u8>) -> ChoreoResult<()> {
        Err(ChoreoError::Persistence(format!("{key}: 磁盘已满")))
    }

    async fn read(&self, _key: &StoreKey) -> ChoreoResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn delete(&self, _key: &StoreKey) -> ChoreoResult<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_create_persists_and_reloads_equivalent_instance() {
    let store = Arc::new(InMemoryStore::new());
    let registry = registry_with(store.clone());

    let args = vec![TaggedValue::number(40)];
    let handle = registry
        .create(HOST, COUNTER, &types(&registry, &args), &args)
        .await
        .unwrap();
    let id = handle.id.clone().expect("counter is persistable");

    let outcome = registry
        .invoke_live(&handle, "add", &[TaggedValue::number(2)])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Int(42));

    // 重新加载的实例通过公开方法观察到相同的值
    let outcome = registry
        .invoke_persisted(COUNTER, &id, "get", &[])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Int(42));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_non_persistable_instance_gets_no_id() {
    let store = Arc::new(InMemoryStore::new());
    let registry = registry_with(store.clone());

    let handle = registry.create(HOST, CALCULATOR, &[], &[]).await.unwrap();
    assert!(handle.id.is_none());
    assert!(handle.address().ends_with("/none"));
    assert!(store.is_empty().await);

    let vector = TaggedValue::new("Vector", json!([3.0, 4.0]));
    let outcome = registry
        .invoke_live(&handle, "normalize", &[vector])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Double(5.0));
    assert_eq!(outcome.args[0].as_object::<Vec<f64>>().unwrap(), &vec![0.6, 0.8]);
}

#[tokio::test]
async fn test_write_failure_degrades_to_non_durable() {
    let registry = registry_with(Arc::new(BrokenStore));
    let handle = registry.create(HOST, COUNTER, &[], &[]).await.unwrap();
    assert!(handle.id.is_none());

    let outcome = registry
        .invoke_live(&handle, "add", &[TaggedValue::number(1)])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Int(1));
}

#[tokio::test]
async fn test_wrapped_class_persists_wrapper() {
    let store = Arc::new(InMemoryStore::new());
    let registry = registry_with(store.clone());
    assert!(registry.is_wrapped(SCALER));
    assert_eq!(registry.wrapper_for(SCALER), Some(SCALER_WRAPPER));

    let args = vec![TaggedValue::double(0.0)];
    let handle = registry
        .create(HOST, SCALER, &types(&registry, &args), &args)
        .await
        .unwrap();
    let id = handle.id.clone().unwrap();

    let bytes = store.read(&StoreKey::new(SCALER, &id)).await.unwrap().unwrap();
    let persisted: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(persisted["wrapper"], SCALER_WRAPPER);
    assert_eq!(persisted["delegate"]["factor"], 1.0);

    let outcome = registry
        .invoke_persisted(SCALER, &id, "describe", &[])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Str("scaler x1".into()));
}

#[tokio::test]
async fn test_refusals() {
    let registry = registry_with(Arc::new(InMemoryStore::new()));

    let err = registry.create(HOST, "demo.Missing", &[], &[]).await.unwrap_err();
    assert!(matches!(err, ChoreoError::UnknownClass(_)));

    let err = registry
        .invoke_persisted(COUNTER, "nope", "get", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ChoreoError::InstanceNotFound { .. }));

    let handle = registry.create(HOST, COUNTER, &[], &[]).await.unwrap();
    let err = registry.invoke_live(&handle, "explode", &[]).await.unwrap_err();
    assert!(matches!(err, ChoreoError::UnknownMethod { .. }));

    let err = registry
        .invoke_live(&handle, "add", &[TaggedValue::string("one")])
        .await
        .unwrap_err();
    assert!(matches!(err, ChoreoError::MethodResolution { .. }));

    let args = vec![TaggedValue::string("x")];
    let err = registry
        .create(HOST, SCALER, &types(&registry, &args), &args)
        .await
        .unwrap_err();
    assert!(matches!(err, ChoreoError::MethodResolution { .. }));
}

#[tokio::test]
async fn test_missing_wrapper_is_a_configuration_error() {
    let mut classes = classes();
    classes.insert(
        "demo.Other",
        ClassConfig {
            wrapper: Some("demo.NoSuchWrapper".to_string()),
            ..Default::default()
        },
    );
    let result = ServiceRegistry::new(
        Arc::new(classes),
        Arc::new(builtin_catalog()),
        Arc::new(SemanticTypeMarshaller::with_builtin_types()),
        Arc::new(InMemoryStore::new()),
    );
    assert!(matches!(result, Err(ChoreoError::Configuration(_))));
}

#[tokio::test]
async fn test_concurrent_calls_on_one_instance_do_not_lose_updates() {
    let registry = Arc::new(registry_with(Arc::new(InMemoryStore::new())));
    let handle = registry.create(HOST, COUNTER, &[], &[]).await.unwrap();
    let id = handle.id.clone().unwrap();

    let calls = (0..20).map(|_| {
        let registry = registry.clone();
        let id = id.clone();
        async move {
            registry
                .invoke_persisted(COUNTER, &id, "add", &[TaggedValue::number(1)])
                .await
        }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let outcome = registry
        .invoke_persisted(COUNTER, &id, "get", &[])
        .await
        .unwrap();
    assert_eq!(outcome.result, NativeValue::Int(20));
}

#[tokio::test]
async fn test_release_drops_live_instance() {
    let registry = registry_with(Arc::new(InMemoryStore::new()));
    let handle = registry.create(HOST, CALCULATOR, &[], &[]).await.unwrap();
    assert_eq!(registry.live_count(), 1);
    assert!(registry.release(handle.instance));
    assert_eq!(registry.live_count(), 0);
    assert!(registry.invoke_live(&handle, "describe", &[]).await.is_err());
}
