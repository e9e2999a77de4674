use std::str::FromStr;

use ini::Ini;

use crate::{
    error::{BSPError, Result},
    packer::MAX_PAGE_WIDTH,
};

/// Knobs of one map parse, read from the `[bsp]` section of `conf.ini`.
///
/// ```ini
/// [bsp]
/// lightmap_page_width = 2048
/// lightmap_page_height = 2048
/// yield_interval = 256
/// prefer_hdr = false
/// displacements = true
/// overlays = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    pub lightmap_page_width: u32,
    pub lightmap_page_height: u32,
    /// Faces between two calls to the pacer. 0 never yields.
    pub yield_interval: usize,
    /// Use FACES_HDR and LIGHTING_HDR when the map has them.
    pub prefer_hdr: bool,
    pub displacements: bool,
    pub overlays: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            lightmap_page_width: 2048,
            lightmap_page_height: 2048,
            yield_interval: 256,
            prefer_hdr: false,
            displacements: true,
            overlays: true,
        }
    }
}

fn value<T: FromStr>(ini: &Ini, key: &str, default: T) -> Result<T> {
    match ini.section(Some("bsp")).and_then(|s| s.get(key)) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BSPError::Config(format!("bad value for {key}: {raw:?}"))),
    }
}

impl BuildConfig {
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let d = Self::default();
        let config = Self {
            lightmap_page_width: value(ini, "lightmap_page_width", d.lightmap_page_width)?,
            lightmap_page_height: value(ini, "lightmap_page_height", d.lightmap_page_height)?,
            yield_interval: value(ini, "yield_interval", d.yield_interval)?,
            prefer_hdr: value(ini, "prefer_hdr", d.prefer_hdr)?,
            displacements: value(ini, "displacements", d.displacements)?,
            overlays: value(ini, "overlays", d.overlays)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lightmap_page_width == 0 || self.lightmap_page_height == 0 {
            return Err(BSPError::Config("lightmap pages must not be empty".into()));
        }
        if self.lightmap_page_width > MAX_PAGE_WIDTH {
            return Err(BSPError::Config(format!(
                "lightmap page width {} is over {}",
                self.lightmap_page_width, MAX_PAGE_WIDTH
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let ini = Ini::load_from_str("[launch]\ngame = hl2\n").unwrap();
        assert_eq!(BuildConfig::from_ini(&ini).unwrap(), BuildConfig::default());
    }

    #[test]
    fn reads_bsp_section() {
        let ini = Ini::load_from_str(
            "[bsp]\nlightmap_page_width = 512\nprefer_hdr = true\noverlays=false\n",
        )
        .unwrap();
        let config = BuildConfig::from_ini(&ini).unwrap();
        assert_eq!(config.lightmap_page_width, 512);
        assert_eq!(config.lightmap_page_height, 2048);
        assert!(config.prefer_hdr);
        assert!(!config.overlays);
        assert!(config.displacements);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for text in [
            "[bsp]\nlightmap_page_width = wide\n",
            "[bsp]\nlightmap_page_width = 70000\n",
            "[bsp]\nlightmap_page_height = 0\n",
            "[bsp]\nprefer_hdr = maybe\n",
        ] {
            let ini = Ini::load_from_str(text).unwrap();
            assert!(matches!(
                BuildConfig::from_ini(&ini),
                Err(BSPError::Config(_))
            ));
        }
    }
}
