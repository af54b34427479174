//! Builds the shim driver. It uses no driver framework: a plain WDM driver
//! with an unload routine is all it needs.

fn main() -> Result<(), wdk_build::ConfigError> {
    let mut config = wdk_build::Config::from_env_auto()?;
    config.driver_config = wdk_build::DriverConfig::Wdm;
    config.configure_binary_build()
}
