use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Connection, Driver, DriverInfo, Instance, Result, StorageError};

/// Shared connection; held across awaits, hence the async lock / 共享连接
pub type ConnectionBox = Arc<tokio::sync::RwLock<Box<dyn Connection>>>;

/// Storage manager (driver registry and opened connections) / 存储管理器
#[derive(Clone, Default)]
pub struct StorageManager {
    factories: Arc<RwLock<HashMap<String, Arc<dyn Driver>>>>,
    connections: Arc<RwLock<HashMap<String, ConnectionBox>>>,
    /// Mount error status (instance name -> error message) / 挂载错误状态
    errors: Arc<RwLock<HashMap<String, String>>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register driver factory under its type name / 注册驱动工厂
    pub fn register_driver(&self, driver: Box<dyn Driver>) {
        let driver_type = driver.driver_type().to_string();
        self.factories.write().insert(driver_type.clone(), Arc::from(driver));
        tracing::info!("Driver factory registered: {}", driver_type);
    }

    pub fn get_driver(&self, driver_type: &str) -> Option<Arc<dyn Driver>> {
        self.factories.read().get(driver_type).cloned()
    }

    /// Connect and open an instance, record error on failure / 连接并打开实例
    pub async fn mount(&self, instance: Instance) -> Result<ConnectionBox> {
        let driver = self
            .get_driver(&instance.driver)
            .ok_or_else(|| StorageError::UnknownDriver(instance.driver.clone()))?;
        let name = instance.name.clone();
        let driver_type = instance.driver.clone();

        let opened = match driver.connect(Arc::new(instance)) {
            Ok(mut conn) => conn.open().await.map(|_| conn),
            Err(e) => Err(e),
        };

        match opened {
            Ok(conn) => {
                let conn: ConnectionBox = Arc::new(tokio::sync::RwLock::new(conn));
                self.connections.write().insert(name.clone(), conn.clone());
                self.errors.write().remove(&name);
                tracing::info!("Storage mounted: {} ({})", name, driver_type);
                Ok(conn)
            }
            Err(e) => {
                self.errors.write().insert(name.clone(), e.to_string());
                tracing::error!("Storage mount failed: {} ({}) - {}", name, driver_type, e);
                Err(e)
            }
        }
    }

    pub fn get_connection(&self, name: &str) -> Option<ConnectionBox> {
        self.connections.read().get(name).cloned()
    }

    /// Close and forget a mounted instance / 卸载实例
    pub async fn unmount(&self, name: &str) -> Result<()> {
        let conn = self
            .connections
            .write()
            .remove(name)
            .ok_or_else(|| StorageError::validation(format!("storage not mounted: {}", name)))?;
        conn.write().await.close().await?;
        tracing::info!("Storage unmounted: {}", name);
        Ok(())
    }

    pub fn get_driver_error(&self, name: &str) -> Option<String> {
        self.errors.read().get(name).cloned()
    }

    pub fn list_connections(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// List all available driver types / 列出所有可用的驱动类型
    pub fn list_driver_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn driver_infos(&self) -> Vec<DriverInfo> {
        self.factories.read().values().map(|d| d.driver_info()).collect()
    }
}
