use crate::utils::smart_to_string::prelude::*;
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynSettingsValue<'a> {
    pub val: String,
    #[serde(borrow)]
    pub description: Option<Cow<'a, str>>,
    #[serde(borrow)]
    pub side_effects: Option<Cow<'a, str>>,
}

pub struct DynSettingsBindValue<'a, T>
where
    T: SmartString,
{
    pub val: T,
    pub description: Option<Cow<'a, str>>,
    pub side_effects: Option<Cow<'a, str>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DynSettingsValueRow {
    pub val: String,
}

pub struct DynSettingsValueBindRow<T>
where
    T: SmartString,
{
    pub val: T,
}

pub type DynSettingsKvMap<'a> = HashMap<&'a str, DynSettingsValue<'a>>;

pub trait DynSetting {
    type Value: SmartString;
    fn key(&self) -> &'static str;
    const DESC: Option<&'static str>;
    const SIDE_EFFECTS: Option<&'static str>;
    fn default_val() -> Self::Value;
    fn parse(&self, s: &str) -> SmartStringResult<Self::Value>;
    fn render(&self, v: &Self::Value) -> SmartStringResult<String>;
}

macro_rules! opt {
    () => {
        None
    };
    ($s:expr) => {
        Some($s)
    };
}

macro_rules! define_dyn_settings {
    (
        $(
            $namespace:ident => {
                $(
                    $variant:ident => {
                        typ: $ty:path,
                        default_val: $default_val:expr
                        $(, desc: $desc:expr)?
                        $(, side_effects: $side_effects:expr)?
                    }
                ),* $(,)?
            }
        ),* $(,)?
    ) => {
        use ahash::HashMapExt;
        use once_cell::sync::Lazy;
        use crate::smart_string;
        use crate::utils::smart_to_string::ParseTarget;

        $(
            $(
                pub struct $variant;

                impl DynSetting for $variant {
                    type Value = $ty;

                    fn key(&self) -> &'static str {
                        concat!(stringify!($namespace), ".", stringify!($variant))
                    }

                    const DESC: Option<&'static str> = opt!($($desc)?);

                    const SIDE_EFFECTS: Option<&'static str> = opt!($($side_effects)?);

                    fn default_val() -> Self::Value {
                        $default_val
                    }

                    fn parse(&self, s: &str) -> SmartStringResult<Self::Value> {
                        ParseTarget::<Self::Value>::NEW.smart_parse(s)
                    }

                    fn render(&self, v: &Self::Value) -> SmartStringResult<String> {
                        (&*v).smart_to_string()
                    }
                }
            )*
        )*

        #[derive(Debug)]
        pub enum DynSettingCollector {
            $( $( $variant, )* )*
        }

        impl DynSettingCollector {
            pub fn original_kv_map() -> &'static DynSettingsKvMap<'static> {
                static KV: Lazy<DynSettingsKvMap> = Lazy::new(|| {
                    let mut m = HashMap::with_capacity(0 $( $( + (stringify!($variant), 1usize).1 )* )*);
                    $(
                        $(
                            {
                                let key = $variant.key();
                                let val = DynSettingsValue {
                                    val: smart_string!($variant::default_val()).unwrap(),
                                    description: $variant::DESC.map(std::borrow::Cow::Borrowed),
                                    side_effects: $variant::SIDE_EFFECTS.map(std::borrow::Cow::Borrowed),
                                };
                                m.insert(key, val);
                            }
                        )*
                    )*
                    m
                });
                &*KV
            }

            pub fn try_parse<'a>(
                key: &str,
                input: &str,
            ) -> Option<SmartStringResult<DynSettingsValue<'a>>> {
                match key {
                    $(
                        $(
                            concat!(stringify!($namespace), ".", stringify!($variant)) => {
                                let s = $variant;
                                Some(match s.parse(input) {
                                    Ok(v) => s.render(&v).map(|rendered| DynSettingsValue {
                                        val: rendered,
                                        description: $variant::DESC.map(std::borrow::Cow::Borrowed),
                                        side_effects: $variant::SIDE_EFFECTS.map(std::borrow::Cow::Borrowed),
                                    }),
                                    Err(e) => Err(e),
                                })
                            },
                        )*
                    )*
                    _ => None,
                }
            }
        }
    };
}

define_dyn_settings! {
    Upload => {
        ChunkUploadThreshold => {
            typ: u64,
            default_val: 1024 * 1024, // 1 MiB: below this, the single-shot path applies
            desc: "Files declared smaller than this many bytes use the single-shot upload path"
        },
        UploadChunkSize => {
            typ: std::num::NonZeroU32,
            default_val: std::num::NonZeroU32::new(1024 * 1024).unwrap(), // 1 MiB
            desc: "The chunk size in bytes used by the chunked upload session manager"
        },
        MaxAssembledSize => {
            typ: u64,
            default_val: crate::models::const_val::MAX_ASSEMBLED_SIZE,
            desc: "Hard cap on the assembled size of a chunked upload, bounds concatenation memory"
        },
        AllowMimeTypes => {
            typ: Option<Vec<Cow<'static, str>>>,
            default_val: Some(
                vec![
                    "image/jpeg",
                    "image/png",
                    "image/gif",
                    "image/webp",
                    "image/tiff",
                    "image/bmp",
                    "image/heif",
                    "image/avif",
                    "audio/mpeg",
                    "audio/wav",
                    "audio/ogg",
                    "application/pdf",
                    "application/msword",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "video/mp4",
                    "video/webm",
                    "video/quicktime",
                    "application/zip",
                    "application/octet-stream",
                ]
                .into_iter()
                .map(|it| it.into())
                .collect()
            ),
            desc: "List of declared MIME types permitted on upload, checked before the magic-number sniff"
        },
        MaxImageSize => {
            typ: u64,
            default_val: crate::models::const_val::CATEGORY_CEILING_IMAGE,
            desc: "Size ceiling in bytes for the image category"
        },
        MaxAudioSize => {
            typ: u64,
            default_val: crate::models::const_val::CATEGORY_CEILING_AUDIO,
            desc: "Size ceiling in bytes for the audio category"
        },
        MaxDocumentSize => {
            typ: u64,
            default_val: crate::models::const_val::CATEGORY_CEILING_DOCUMENT,
            desc: "Size ceiling in bytes for the document category"
        },
        MaxVideoSize => {
            typ: u64,
            default_val: crate::models::const_val::CATEGORY_CEILING_VIDEO,
            desc: "Size ceiling in bytes for the video category"
        },
        MaxOtherSize => {
            typ: u64,
            default_val: crate::models::const_val::CATEGORY_CEILING_OTHER,
            desc: "Size ceiling in bytes for any category not otherwise classified"
        },
    }
}
