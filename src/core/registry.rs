use once_cell::sync::Lazy;
use std::collections::HashMap;

pub struct Preset {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

pub static PRESET_REGISTRY: Lazy<HashMap<String, Preset>> = Lazy::new(|| {
    let mut registry = HashMap::new();

    // Square feed post
    registry.insert(
        "instagram".to_string(),
        Preset {
            label: "Instagram".to_string(),
            width: 1080,
            height: 1080,
        },
    );

    // Vertical 9:16
    registry.insert(
        "story".to_string(),
        Preset {
            label: "Story".to_string(),
            width: 1080,
            height: 1920,
        },
    );

    // 16:9 card
    registry.insert(
        "twitter".to_string(),
        Preset {
            label: "Twitter".to_string(),
            width: 1200,
            height: 675,
        },
    );

    registry
});

pub fn lookup(name: &str) -> Option<&'static Preset> {
    PRESET_REGISTRY.get(&name.to_lowercase())
}
