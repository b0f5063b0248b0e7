mod support;

use persistence_core::{
    active_logging, ConfigError, EntityManager, Handle, LogLevel, LoggingConfig, LoggingError,
    ManagerConfig, ManagerError, ObjectManager,
};
use support::{author, Author};

#[test]
fn open_starts_logging_from_the_manager_config() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let mut config = ManagerConfig::file(dir.path().join("objects.sqlite3"));
    config.logging = Some(LoggingConfig::new(&logs).with_level(LogLevel::Debug));

    let mut em = EntityManager::open(&config).unwrap();
    assert!(logs.is_dir());
    assert_eq!(active_logging(), config.logging.clone());

    em.persist(&Handle::new(author("ada", "Ada"))).unwrap();
    em.flush().unwrap();

    let mut reopened = EntityManager::open(&config).unwrap();
    assert!(reopened.find::<Author>("ada").unwrap().is_some());

    let mut quieter = config.clone();
    quieter.logging = Some(LoggingConfig::new(&logs).with_level(LogLevel::Error));
    assert!(matches!(
        EntityManager::open(&quieter),
        Err(ManagerError::Logging(LoggingError::AlreadyInitialized { .. }))
    ));
}

#[test]
fn open_rejects_a_relative_log_dir() {
    let mut config = ManagerConfig::in_memory();
    config.logging = Some(LoggingConfig::new("logs"));
    assert!(matches!(
        EntityManager::open(&config),
        Err(ManagerError::Config(ConfigError::RelativeLogDir(_)))
    ));
}
