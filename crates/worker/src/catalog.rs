//! 启动时构建的类与包装器描述表

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::ClassDescriptor;
use crate::instance::WrapperDescriptor;

/// 本进程实现了哪些类，是否允许使用由配置决定
#[derive(Debug, Default, Clone)]
pub struct ServiceCatalog {
    classes: HashMap<String, Arc<ClassDescriptor>>,
    wrappers: HashMap<String, Arc<WrapperDescriptor>>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, descriptor: ClassDescriptor) -> &mut Self {
        debug!("登记类: {}", descriptor.name());
        self.classes
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        self
    }

    pub fn register_wrapper(&mut self, descriptor: WrapperDescriptor) -> &mut Self {
        debug!("登记包装器: {}", descriptor.name());
        self.wrappers
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        self
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(name).cloned()
    }

    pub fn wrapper(&self, name: &str) -> Option<Arc<WrapperDescriptor>> {
        self.wrappers.get(name).cloned()
    }

    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
