//! 惰性实例游标
//!
//! [`ServiceLocations`] 由一层主序列和一个可选的回退游标组成。
//! 主序列在第一次 `next()` 时才向后端取数；主序列耗尽后才构造并消费回退游标，
//! 因此远端数据中心只有在近端全部耗尽时才会被查询。

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use futures::FutureExt;

use crate::error::{ConsultantError, Result};

use super::instance::ServiceInstance;

/// 单层实例序列
pub type InstanceIter = Box<dyn Iterator<Item = ServiceInstance> + Send>;

type InstanceSupplier = Arc<dyn Fn() -> BoxFuture<'static, Result<InstanceIter>> + Send + Sync>;
type FallbackSupplier =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<ServiceLocations>>> + Send + Sync>;
type InstanceMapper = Arc<dyn Fn(InstanceIter) -> InstanceIter + Send + Sync>;
type InstanceListener = Arc<dyn Fn(&ServiceInstance) + Send + Sync>;

enum Fallback {
    None,
    Ready(Box<ServiceLocations>),
    Deferred(FallbackSupplier),
}

/// 按优先级分层的实例游标
///
/// 每个游标只能被一个调用方消费；需要重新遍历时向路由策略重新申请游标。
pub struct ServiceLocations {
    supplier: InstanceSupplier,
    fallback: Fallback,
    instances: Option<InstanceIter>,
    listener: Option<InstanceListener>,
}

impl ServiceLocations {
    /// 由异步序列提供者构造单层游标
    pub fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<InstanceIter>> + Send + Sync + 'static,
    {
        Self {
            supplier: Arc::new(supplier),
            fallback: Fallback::None,
            instances: None,
            listener: None,
        }
    }

    /// 由固定实例列表构造单层游标
    pub fn from_instances(instances: Vec<ServiceInstance>) -> Self {
        Self::new(move || {
            let instances = instances.clone();
            async move { Ok(Box::new(instances.into_iter()) as InstanceIter) }.boxed()
        })
    }

    /// 设置主序列耗尽后使用的回退游标
    pub fn with_fallback(mut self, fallback: ServiceLocations) -> Self {
        self.fallback = Fallback::Ready(Box::new(fallback));
        self.propagate_listener();
        self
    }

    /// 设置延迟构造的回退游标，仅在主序列耗尽时调用一次
    pub fn with_deferred_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Option<ServiceLocations>>> + Send + Sync + 'static,
    {
        self.fallback = Fallback::Deferred(Arc::new(fallback));
        self
    }

    /// 设置实例被取出时的回调，对回退游标同样生效
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&ServiceInstance) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self.propagate_listener();
        self
    }

    fn propagate_listener(&mut self) {
        if let (Some(listener), Fallback::Ready(fallback)) = (&self.listener, &mut self.fallback) {
            fallback.listener = Some(listener.clone());
            fallback.propagate_listener();
        }
    }

    /// 对每一层序列（包括所有回退层）应用变换
    pub fn map<F>(self, mapper: F) -> Self
    where
        F: Fn(InstanceIter) -> InstanceIter + Send + Sync + 'static,
    {
        self.map_tiers(Arc::new(mapper))
    }

    /// 只对主序列应用变换，回退层保持原样
    pub fn map_primary<F>(self, mapper: F) -> Self
    where
        F: Fn(InstanceIter) -> InstanceIter + Send + Sync + 'static,
    {
        Self {
            supplier: mapped_supplier(self.supplier, Arc::new(mapper)),
            fallback: self.fallback,
            instances: None,
            listener: self.listener,
        }
    }

    fn map_tiers(self, mapper: InstanceMapper) -> Self {
        let fallback = match self.fallback {
            Fallback::None => Fallback::None,
            Fallback::Ready(fallback) => Fallback::Ready(Box::new(fallback.map_tiers(mapper.clone()))),
            Fallback::Deferred(supplier) => {
                let mapper = mapper.clone();
                Fallback::Deferred(Arc::new(move || {
                    let pending = supplier();
                    let mapper = mapper.clone();
                    async move { Ok(pending.await?.map(|fallback| fallback.map_tiers(mapper))) }
                        .boxed()
                }))
            }
        };

        Self {
            supplier: mapped_supplier(self.supplier, mapper),
            fallback,
            instances: None,
            listener: self.listener,
        }
    }

    /// 取出下一个实例，全部层耗尽时返回 `Ok(None)`
    pub fn next(&mut self) -> BoxFuture<'_, Result<Option<ServiceInstance>>> {
        async move {
            if self.instances.is_none() {
                self.instances = Some((self.supplier)().await?);
            }
            if let Some(instance) = self.instances.as_mut().and_then(|instances| instances.next()) {
                if let Some(listener) = &self.listener {
                    listener(&instance);
                }
                return Ok(Some(instance));
            }

            if let Fallback::Deferred(supplier) = &self.fallback {
                let pending = supplier();
                self.fallback = match pending.await? {
                    Some(fallback) => Fallback::Ready(Box::new(fallback)),
                    None => Fallback::None,
                };
                self.propagate_listener();
            }

            match &mut self.fallback {
                Fallback::Ready(fallback) => fallback.next().await,
                _ => Ok(None),
            }
        }
        .boxed()
    }

    /// 转换为实例流
    pub fn into_stream(self) -> impl Stream<Item = Result<ServiceInstance>> + Send {
        stream::try_unfold(self, |mut locations| async move {
            let next = locations.next().await?;
            Ok::<_, ConsultantError>(next.map(|instance| (instance, locations)))
        })
    }
}

fn mapped_supplier(supplier: InstanceSupplier, mapper: InstanceMapper) -> InstanceSupplier {
    Arc::new(move || {
        let pending = supplier();
        let mapper = mapper.clone();
        async move { Ok(mapper(pending.await?)) }.boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::instance::{Node, Service};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance(node: &str) -> ServiceInstance {
        ServiceInstance::new(Node::new(node, "10.0.0.1"), Service::new("svc", "svc", 80))
    }

    #[tokio::test]
    async fn fallback_is_built_only_after_primary_is_exhausted() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_ref = built.clone();
        let mut locations = ServiceLocations::from_instances(vec![instance("a")])
            .with_deferred_fallback(move || {
                built_ref.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some(ServiceLocations::from_instances(vec![instance("b")]))) }.boxed()
            });

        assert_eq!(locations.next().await.unwrap(), Some(instance("a")));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(locations.next().await.unwrap(), Some(instance("b")));
        assert_eq!(locations.next().await.unwrap(), None);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_sees_instances_from_every_tier() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_ref = seen.clone();
        let mut locations = ServiceLocations::from_instances(vec![instance("a")])
            .with_deferred_fallback(|| {
                async { Ok(Some(ServiceLocations::from_instances(vec![instance("b")]))) }.boxed()
            })
            .with_listener(move |i| seen_ref.lock().unwrap().push(i.node().node.clone()));

        while locations.next().await.unwrap().is_some() {}
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn map_primary_leaves_fallback_untouched() {
        let mut locations = ServiceLocations::from_instances(vec![instance("a"), instance("b")])
            .with_fallback(ServiceLocations::from_instances(vec![instance("c"), instance("d")]))
            .map_primary(|iter| Box::new(iter.collect::<Vec<_>>().into_iter().rev()));

        let mut order = Vec::new();
        while let Some(i) = locations.next().await.unwrap() {
            order.push(i.node().node.clone());
        }
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }
}
