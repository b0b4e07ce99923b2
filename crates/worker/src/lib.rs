pub mod builtin;
pub mod catalog;
pub mod descriptor;
pub mod instance;
pub mod locks;
pub mod marshalling;
pub mod registry;
pub mod values;

pub use builtin::builtin_catalog;
pub use catalog::ServiceCatalog;
pub use descriptor::{ClassBuilder, ClassDescriptor, ConstructorDescriptor, MethodDescriptor};
pub use instance::{Invocable, ResolvedMethod, ServiceInstance, WrappedService, WrapperDescriptor};
pub use locks::KeyedLocks;
pub use marshalling::{SemanticSerializer, SemanticTypeMarshaller, TypeHierarchy};
pub use registry::{CallOutcome, ServiceRegistry, SharedInstance};
pub use values::{NativeType, NativeValue, ObjectValue};
