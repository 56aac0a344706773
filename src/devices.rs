//! Device emulation profiles

use crate::session::traits::Viewport;
use crate::{Error, Result};
use phf::phf_map;

/// A named emulation profile applied to a new context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Device {
    pub user_agent: &'static str,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
}

const CHROME_DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const IOS_SAFARI_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";
const IPAD_SAFARI_UA: &str = "Mozilla/5.0 (iPad; CPU OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";
const ANDROID_CHROME_UA: &str = "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

static DEVICES: phf::Map<&'static str, Device> = phf_map! {
    "Desktop Chrome" => Device {
        user_agent: CHROME_DESKTOP_UA,
        viewport: Viewport { width: 1280, height: 720 },
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
    },
    "Desktop Chrome HiDPI" => Device {
        user_agent: CHROME_DESKTOP_UA,
        viewport: Viewport { width: 1280, height: 720 },
        device_scale_factor: 2.0,
        is_mobile: false,
        has_touch: false,
    },
    "iPhone X" => Device {
        user_agent: IOS_SAFARI_UA,
        viewport: Viewport { width: 375, height: 812 },
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
    },
    "iPhone 12" => Device {
        user_agent: IOS_SAFARI_UA,
        viewport: Viewport { width: 390, height: 664 },
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
    },
    "iPhone 13 Pro Max" => Device {
        user_agent: IOS_SAFARI_UA,
        viewport: Viewport { width: 428, height: 746 },
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
    },
    "iPad Pro 11" => Device {
        user_agent: IPAD_SAFARI_UA,
        viewport: Viewport { width: 834, height: 1194 },
        device_scale_factor: 2.0,
        is_mobile: true,
        has_touch: true,
    },
    "Pixel 5" => Device {
        user_agent: ANDROID_CHROME_UA,
        viewport: Viewport { width: 393, height: 727 },
        device_scale_factor: 2.75,
        is_mobile: true,
        has_touch: true,
    },
    "Galaxy S9+" => Device {
        user_agent: "Mozilla/5.0 (Linux; Android 8.0.0; SM-G965U Build/R16NW) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
        viewport: Viewport { width: 320, height: 658 },
        device_scale_factor: 4.5,
        is_mobile: true,
        has_touch: true,
    },
};

/// Names of every known profile, sorted
pub fn device_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = DEVICES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Look up a profile by name
pub fn get_device(name: &str) -> Result<Device> {
    DEVICES.get(name).copied().ok_or_else(|| {
        Error::invalid_argument(format!(
            "Please set one of the given device models \n{}",
            device_names().join("\n")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_device() {
        let device = get_device("iPhone X").unwrap();
        assert_eq!(device.viewport, Viewport { width: 375, height: 812 });
        assert!(device.is_mobile);
    }

    #[test]
    fn test_unknown_device_lists_models() {
        let err = get_device("Nokia 3310").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Pixel 5"));
        assert!(message.contains("iPhone X"));
    }
}
