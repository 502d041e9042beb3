//! Static-style lookups through the process-wide registry

use std::sync::{Arc, OnceLock};

use cltopo_core::{Device, DeviceType, FixtureApi, Platform, Registry};

fn global() -> &'static Registry {
    static INSTALLED: OnceLock<&'static Registry> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let api = FixtureApi::from_toml(include_str!("../fixtures/two_platforms.toml")).unwrap();
        Registry::install_global(Registry::new(Arc::new(api))).unwrap()
    })
}

#[test]
fn test_install_once() {
    let installed = global();
    assert!(std::ptr::eq(installed, Registry::global().unwrap()));
    let again = FixtureApi::from_toml("").unwrap();
    assert!(Registry::install_global(Registry::new(Arc::new(again))).is_err());
}

#[test]
fn test_platform_statics() {
    global();
    let platforms = Platform::get_all().unwrap();
    assert_eq!(platforms.len(), Platform::count().unwrap());
    let first = &platforms[0];
    assert_eq!(Platform::find_by_id(first.id()).unwrap().as_ref(), Some(first));
    assert_eq!(&Platform::get_default().unwrap(), first);
}

#[test]
fn test_device_statics() {
    global();
    assert_eq!(Device::find_by_type(DeviceType::GPU).unwrap().len(), 1);
    assert_eq!(Device::find_by_type(DeviceType::ALL).unwrap().len(), 3);

    let default = Device::get_default().unwrap();
    assert!(default.is_gpu().unwrap());
    Device::set_default(&default).unwrap();
    assert_eq!(Device::get_default().unwrap(), default);
}
