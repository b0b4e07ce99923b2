//! 服务注册表：创建、加载、保存服务实例，并持有本请求内的活动实例

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use choreo_core::{ChoreoError, ChoreoResult, ClassesConfiguration, CONSTRUCTOR_METHOD};
use choreo_domain::{DurableStore, InstanceKey, ServiceHandle, StoreKey, TaggedValue};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ServiceCatalog;
use crate::descriptor::ClassDescriptor;
use crate::instance::{Invocable, ResolvedMethod, ServiceInstance, WrappedService};
use crate::locks::KeyedLocks;
use crate::marshalling::SemanticTypeMarshaller;
use crate::values::{NativeType, NativeValue};

pub type SharedInstance = Arc<AsyncMutex<Box<dyn Invocable>>>;

/// 一次调用的结果：返回值以及调用后的实参
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: NativeValue,
    pub args: Vec<NativeValue>,
}

pub struct ServiceRegistry {
    classes: Arc<ClassesConfiguration>,
    catalog: Arc<ServiceCatalog>,
    marshaller: Arc<SemanticTypeMarshaller>,
    store: Arc<dyn DurableStore>,
    locks: KeyedLocks,
    live: Mutex<HashMap<InstanceKey, SharedInstance>>,
}

impl ServiceRegistry {
    /// 配置引用的包装器必须存在于目录中
    pub fn new(
        classes: Arc<ClassesConfiguration>,
        catalog: Arc<ServiceCatalog>,
        marshaller: Arc<SemanticTypeMarshaller>,
        store: Arc<dyn DurableStore>,
    ) -> ChoreoResult<Self> {
        for class in classes.class_names() {
            if catalog.class(class).is_none() {
                warn!("类 {class} 已配置但本进程没有实现，调用将被拒绝");
            }
            if let Some(wrapper) = classes.wrapper_for(class) {
                if catalog.wrapper(wrapper).is_none() {
                    return Err(ChoreoError::Configuration(format!(
                        "类 {class} 的包装器 {wrapper} 不存在"
                    )));
                }
            }
        }
        info!("服务注册表已就绪, 配置了 {} 个类", classes.len());

        Ok(Self {
            classes,
            catalog,
            marshaller,
            store,
            locks: KeyedLocks::new(),
            live: Mutex::new(HashMap::new()),
        })
    }

    pub fn classes(&self) -> &ClassesConfiguration {
        &self.classes
    }

    pub fn marshaller(&self) -> &SemanticTypeMarshaller {
        &self.marshaller
    }

    pub fn is_known_class(&self, class: &str) -> bool {
        self.classes.is_known_class(class)
    }

    pub fn is_wrapped(&self, class: &str) -> bool {
        self.classes.is_wrapped(class)
    }

    pub fn wrapper_for(&self, class: &str) -> Option<&str> {
        self.classes.wrapper_for(class)
    }

    /// 构造新实例；实例能持久化时分配 id 并立即写入存储
    pub async fn create(
        &self,
        host: &str,
        class: &str,
        types: &[String],
        values: &[TaggedValue],
    ) -> ChoreoResult<ServiceHandle> {
        let descriptor = self.descriptor(class, CONSTRUCTOR_METHOD)?;
        let constructor = descriptor
            .resolve_constructor(types, &self.marshaller)
            .ok_or_else(|| resolution_error(class, CONSTRUCTOR_METHOD, types))?;
        let mut args = self.convert_args(constructor.params(), values)?;

        let instance: Box<dyn Invocable> = match self.classes.wrapper_for(class) {
            Some(wrapper) => {
                let wrapper = self
                    .catalog
                    .wrapper(wrapper)
                    .ok_or_else(|| ChoreoError::Internal(format!("包装器 {wrapper} 不存在")))?;
                Box::new(WrappedService::build(wrapper, descriptor.clone(), constructor, &mut args)?)
            }
            None => Box::new(ServiceInstance::construct(descriptor.clone(), constructor, &mut args)?),
        };

        let id = match instance.snapshot() {
            None => {
                debug!("类 {class} 的实例不可持久化, 仅在本进程内可用");
                None
            }
            Some(Err(e)) => {
                warn!("类 {class} 的实例序列化失败, 降级为不可持久化: {e}");
                None
            }
            Some(Ok(bytes)) => {
                let id = Uuid::new_v4().to_string();
                let key = StoreKey::new(class, &id);
                let _guard = self.locks.lock(&key).await;
                match self.store.write(&key, bytes).await {
                    Ok(()) => Some(id),
                    Err(e) => {
                        warn!("实例 {key} 写入失败, 降级为不可持久化: {e}");
                        None
                    }
                }
            }
        };

        let handle = ServiceHandle {
            host: host.to_string(),
            class: class.to_string(),
            id,
            instance: InstanceKey::new(),
        };
        self.lock_live()
            .insert(handle.instance, Arc::new(AsyncMutex::new(instance)));
        info!("已创建服务实例 {}", handle.address());
        Ok(handle)
    }

    /// 从持久化存储重建实例
    pub async fn load(&self, class: &str, id: &str) -> ChoreoResult<Box<dyn Invocable>> {
        let descriptor = self.descriptor(class, CONSTRUCTOR_METHOD)?;
        let key = StoreKey::new(class, id);
        let bytes = self
            .store
            .read(&key)
            .await?
            .ok_or_else(|| ChoreoError::InstanceNotFound {
                class: class.to_string(),
                id: id.to_string(),
            })?;

        let instance: Box<dyn Invocable> = match self.classes.wrapper_for(class) {
            Some(wrapper) => {
                let wrapper = self
                    .catalog
                    .wrapper(wrapper)
                    .ok_or_else(|| ChoreoError::Internal(format!("包装器 {wrapper} 不存在")))?;
                Box::new(WrappedService::restore(wrapper, descriptor, &bytes)?)
            }
            None => Box::new(ServiceInstance::restore(descriptor, &bytes)?),
        };
        debug!("已加载实例 {key}");
        Ok(instance)
    }

    pub async fn save(&self, class: &str, id: &str, instance: &dyn Invocable) -> ChoreoResult<()> {
        let key = StoreKey::new(class, id);
        let bytes = instance
            .snapshot()
            .ok_or_else(|| ChoreoError::Persistence(format!("实例 {key} 不可持久化")))??;
        self.store.write(&key, bytes).await?;
        debug!("已保存实例 {key}");
        Ok(())
    }

    /// 在持久化实例上调用方法：加锁后 load -> invoke -> save
    pub async fn invoke_persisted(
        &self,
        class: &str,
        id: &str,
        method: &str,
        values: &[TaggedValue],
    ) -> ChoreoResult<CallOutcome> {
        self.ensure_method_known(class, method)?;
        let key = StoreKey::new(class, id);
        let _guard = self.locks.lock(&key).await;

        let mut instance = self.load(class, id).await?;
        let (resolved, mut args) = self.prepare_call(&*instance, class, method, values)?;
        let result = instance.invoke(&resolved, &mut args);

        // 调用失败时实例也可能已被修改，照常保存
        if let Err(e) = self.save(class, id, &*instance).await {
            error!("调用后保存实例 {key} 失败: {e}");
        }
        result.map(|result| CallOutcome { result, args })
    }

    /// 在本请求创建的实例上调用方法，可持久化的实例调用后写回存储
    pub async fn invoke_live(
        &self,
        handle: &ServiceHandle,
        method: &str,
        values: &[TaggedValue],
    ) -> ChoreoResult<CallOutcome> {
        self.ensure_method_known(&handle.class, method)?;
        let shared = self
            .live_instance(handle.instance)
            .ok_or_else(|| ChoreoError::Internal(format!("实例 {} 已释放", handle.address())))?;

        let _guard = match &handle.id {
            Some(id) => Some(self.locks.lock(&StoreKey::new(&handle.class, id)).await),
            None => None,
        };
        let mut instance = shared.lock().await;
        let (resolved, mut args) = self.prepare_call(&**instance, &handle.class, method, values)?;
        let result = instance.invoke(&resolved, &mut args);

        if let Some(id) = &handle.id {
            if let Err(e) = self.save(&handle.class, id, &**instance).await {
                error!("调用后保存实例 {} 失败: {e}", handle.address());
            }
        }
        result.map(|result| CallOutcome { result, args })
    }

    pub fn live_instance(&self, key: InstanceKey) -> Option<SharedInstance> {
        self.lock_live().get(&key).cloned()
    }

    /// 请求结束时释放本请求创建的实例
    pub fn release(&self, key: InstanceKey) -> bool {
        self.lock_live().remove(&key).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.lock_live().len()
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, HashMap<InstanceKey, SharedInstance>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn descriptor(&self, class: &str, method: &str) -> ChoreoResult<Arc<ClassDescriptor>> {
        self.ensure_method_known(class, method)?;
        self.catalog
            .class(class)
            .ok_or_else(|| ChoreoError::UnknownClass(class.to_string()))
    }

    fn ensure_method_known(&self, class: &str, method: &str) -> ChoreoResult<()> {
        if !self.classes.is_known_class(class) {
            return Err(ChoreoError::UnknownClass(class.to_string()));
        }
        if !self.classes.is_method_known(class, method) {
            return Err(ChoreoError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            });
        }
        Ok(())
    }

    fn prepare_call(
        &self,
        instance: &dyn Invocable,
        class: &str,
        method: &str,
        values: &[TaggedValue],
    ) -> ChoreoResult<(ResolvedMethod, Vec<NativeValue>)> {
        let types = self.promote_all(values);
        let resolved = instance
            .resolve_method(method, &types, &self.marshaller)
            .ok_or_else(|| resolution_error(class, method, &types))?;
        debug!("{class}::{method} 解析为 ({})", join_types(&resolved.params));
        let args = self.convert_args(&resolved.params, values)?;
        Ok((resolved, args))
    }

    pub fn promote_all(&self, values: &[TaggedValue]) -> Vec<String> {
        values.iter().map(|v| self.marshaller.promote(v)).collect()
    }

    /// 只转换声明个数的实参
    fn convert_args(&self, params: &[NativeType], values: &[TaggedValue]) -> ChoreoResult<Vec<NativeValue>> {
        params
            .iter()
            .zip(values)
            .map(|(param, value)| self.marshaller.from_semantic(value, param))
            .collect()
    }
}

fn join_types(params: &[NativeType]) -> String {
    params.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
}

fn resolution_error(class: &str, method: &str, types: &[String]) -> ChoreoError {
    ChoreoError::MethodResolution {
        class: class.to_string(),
        method: method.to_string(),
        types: types.join(", "),
    }
}
