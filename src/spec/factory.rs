//! Validated construction and parsing of path specifications.

use std::collections::BTreeMap;

use crate::VfsError;

use super::{AttributeValue, PathSpec, TypeIndicator};

/// Expected kind of one addressing attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrKind {
    Text,
    Uint,
    Bytes,
}

/// Required and optional attributes for one type indicator.
struct AttributeRules {
    required: &'static [(&'static str, AttrKind)],
    optional: &'static [(&'static str, AttrKind)],
}

const NO_ATTRS: AttributeRules = AttributeRules {
    required: &[],
    optional: &[],
};

const LOCATION_ONLY: AttributeRules = AttributeRules {
    required: &[("location", AttrKind::Text)],
    optional: &[],
};

/// Optional addressing attributes shared by the file-system family.
const FS_OPTIONAL: &[(&'static str, AttrKind)] =
    &[("inode", AttrKind::Uint), ("identifier", AttrKind::Uint)];

fn rules(indicator: TypeIndicator) -> AttributeRules {
    use TypeIndicator as T;
    match indicator {
        T::Os | T::Fake | T::Cpio | T::Tar | T::Zip => LOCATION_ONLY,
        T::Mount => AttributeRules {
            required: &[("identifier", AttrKind::Text)],
            optional: &[],
        },
        T::DataRange => AttributeRules {
            required: &[
                ("range_offset", AttrKind::Uint),
                ("range_size", AttrKind::Uint),
            ],
            optional: &[],
        },
        T::CompressedStream => AttributeRules {
            required: &[("compression_method", AttrKind::Text)],
            optional: &[],
        },
        T::EncodedStream => AttributeRules {
            required: &[("encoding_method", AttrKind::Text)],
            optional: &[],
        },
        T::EncryptedStream => AttributeRules {
            required: &[("encryption_method", AttrKind::Text)],
            optional: &[
                ("cipher_mode", AttrKind::Text),
                ("initialization_vector", AttrKind::Bytes),
                ("key", AttrKind::Bytes),
            ],
        },
        T::Gzip | T::Bzip2 | T::Xz | T::Lzma => NO_ATTRS,
        T::Raw | T::Ewf | T::Qcow | T::Vhdi | T::Vmdk | T::Modi | T::Phdi | T::Smraw => NO_ATTRS,
        T::Bde => AttributeRules {
            required: &[],
            optional: &[
                ("password", AttrKind::Text),
                ("recovery_password", AttrKind::Text),
                ("startup_key", AttrKind::Text),
            ],
        },
        T::Fvde => AttributeRules {
            required: &[],
            optional: &[
                ("password", AttrKind::Text),
                ("recovery_password", AttrKind::Text),
                ("encrypted_root_plist", AttrKind::Text),
            ],
        },
        T::Luksde => AttributeRules {
            required: &[],
            optional: &[("password", AttrKind::Text)],
        },
        T::ApfsContainer | T::Lvm => AttributeRules {
            required: &[],
            optional: &[
                ("location", AttrKind::Text),
                ("volume_index", AttrKind::Uint),
                ("start_offset", AttrKind::Uint),
            ],
        },
        T::Vshadow => AttributeRules {
            required: &[],
            optional: &[
                ("location", AttrKind::Text),
                ("store_index", AttrKind::Uint),
                ("start_offset", AttrKind::Uint),
            ],
        },
        T::Gpt | T::Apm | T::Mbr | T::TskPartition => AttributeRules {
            required: &[],
            optional: &[
                ("location", AttrKind::Text),
                ("part_index", AttrKind::Uint),
                ("start_offset", AttrKind::Uint),
            ],
        },
        T::Ntfs => AttributeRules {
            required: &[("location", AttrKind::Text)],
            optional: &[
                ("mft_entry", AttrKind::Uint),
                ("mft_attribute", AttrKind::Uint),
                ("data_stream", AttrKind::Text),
                ("identifier", AttrKind::Uint),
            ],
        },
        T::Apfs | T::Ext | T::Hfs | T::Xfs | T::Fat | T::Tsk => AttributeRules {
            required: &[("location", AttrKind::Text)],
            optional: FS_OPTIONAL,
        },
        T::SqliteBlob => AttributeRules {
            required: &[
                ("table_name", AttrKind::Text),
                ("column_name", AttrKind::Text),
            ],
            optional: &[
                ("row_index", AttrKind::Uint),
                ("row_condition", AttrKind::Text),
            ],
        },
    }
}

fn lookup(indicator: TypeIndicator, key: &str) -> Option<(&'static str, AttrKind)> {
    let rules = rules(indicator);
    rules
        .required
        .iter()
        .chain(rules.optional.iter())
        .copied()
        .find(|(name, _)| *name == key)
}

fn spec_error(indicator: TypeIndicator, reason: impl std::fmt::Display) -> VfsError {
    VfsError::PathSpec {
        reason: format!("{indicator}: {reason}"),
    }
}

/// Builder for one record of a chain.
///
/// Validation happens in [`build`](PathSpecBuilder::build): required
/// attributes must be present and well-typed, unknown attributes are
/// rejected, and the parent-presence rule for the record's type is enforced
/// (system-level types must have no parent, all others must have one).
#[derive(Debug)]
pub struct PathSpecBuilder {
    indicator: TypeIndicator,
    parent: Option<PathSpec>,
    pending: Vec<(String, AttributeValue)>,
}

impl PathSpecBuilder {
    pub(super) fn new(indicator: TypeIndicator) -> Self {
        Self {
            indicator,
            parent: None,
            pending: Vec::new(),
        }
    }

    /// Set the parent record.
    pub fn parent(mut self, parent: PathSpec) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set a text attribute.
    pub fn text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pending
            .push((key.into(), AttributeValue::Text(value.into())));
        self
    }

    /// Set an unsigned integer attribute.
    pub fn uint(mut self, key: impl Into<String>, value: u64) -> Self {
        self.pending.push((key.into(), AttributeValue::Uint(value)));
        self
    }

    /// Set a byte-string attribute.
    pub fn bytes(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.pending
            .push((key.into(), AttributeValue::Bytes(value.into())));
        self
    }

    /// Validate and produce the record.
    ///
    /// # Errors
    ///
    /// [`VfsError::PathSpec`] on a missing or unknown attribute, a wrongly
    /// typed value, or a parent-presence violation.
    pub fn build(self) -> Result<PathSpec, VfsError> {
        let indicator = self.indicator;

        if indicator.is_system_level() {
            if self.parent.is_some() {
                return Err(spec_error(indicator, "system-level type takes no parent"));
            }
        } else if self.parent.is_none() {
            return Err(spec_error(indicator, "non-system type requires a parent"));
        }

        let mut attrs: BTreeMap<&'static str, AttributeValue> = BTreeMap::new();
        for (key, value) in self.pending {
            let Some((canonical, kind)) = lookup(indicator, &key) else {
                return Err(spec_error(indicator, format!("unknown attribute: {key}")));
            };
            let matches_kind = matches!(
                (&value, kind),
                (AttributeValue::Text(_), AttrKind::Text)
                    | (AttributeValue::Uint(_), AttrKind::Uint)
                    | (AttributeValue::Bytes(_), AttrKind::Bytes)
            );
            if !matches_kind {
                return Err(spec_error(
                    indicator,
                    format!("attribute {key} has the wrong kind"),
                ));
            }
            if attrs.insert(canonical, value).is_some() {
                return Err(spec_error(indicator, format!("duplicate attribute: {key}")));
            }
        }

        for (name, _) in rules(indicator).required {
            if !attrs.contains_key(name) {
                return Err(spec_error(indicator, format!("missing attribute: {name}")));
            }
        }

        // Locations below the OS layer are file-system absolute.
        if indicator != TypeIndicator::Os {
            if let Some(AttributeValue::Text(location)) = attrs.get("location") {
                if !location.starts_with('/') {
                    return Err(spec_error(
                        indicator,
                        format!("location must be absolute: {location}"),
                    ));
                }
            }
        }

        if indicator.is_volume_system() {
            let addressing = ["location", "volume_index", "store_index", "part_index"]
                .iter()
                .filter(|key| attrs.contains_key(**key))
                .count();
            if addressing > 1 {
                return Err(spec_error(
                    indicator,
                    "at most one of location and a volume index may be set",
                ));
            }
        }

        if indicator == TypeIndicator::SqliteBlob {
            let by_index = attrs.contains_key("row_index");
            let by_condition = attrs.contains_key("row_condition");
            if by_index == by_condition {
                return Err(spec_error(
                    indicator,
                    "exactly one of row_index and row_condition is required",
                ));
            }
        }

        Ok(PathSpec::from_parts(indicator, self.parent, attrs))
    }
}

/// Parse a chain back from its comparable form.
///
/// Inverse of [`PathSpec::comparable`]: `parse(&spec.comparable()) == spec`
/// for every well-formed specification.
///
/// # Errors
///
/// [`VfsError::PathSpec`] on unknown indicators, unknown attributes, value
/// syntax errors, or a chain whose first record is not system-level.
pub fn parse(comparable: &str) -> Result<PathSpec, VfsError> {
    let mut chain: Option<PathSpec> = None;
    let mut any = false;
    for line in comparable.lines() {
        if line.is_empty() {
            continue;
        }
        any = true;
        let mut tokens = split_tokens(line)?.into_iter();
        let type_token = tokens.next().ok_or_else(|| VfsError::PathSpec {
            reason: format!("empty record line: {line}"),
        })?;
        let indicator_name =
            type_token
                .strip_prefix("type=")
                .ok_or_else(|| VfsError::PathSpec {
                    reason: format!("record line must start with type=: {line}"),
                })?;
        let indicator: TypeIndicator = unescape(indicator_name)?.parse()?;

        let mut builder = PathSpec::builder(indicator);
        if let Some(parent) = chain.take() {
            builder = builder.parent(parent);
        }
        for token in tokens {
            let (key, raw_value) = token.split_once('=').ok_or_else(|| VfsError::PathSpec {
                reason: format!("malformed attribute: {token}"),
            })?;
            let Some((_, kind)) = lookup(indicator, key) else {
                return Err(spec_error(indicator, format!("unknown attribute: {key}")));
            };
            builder = match kind {
                AttrKind::Text => builder.text(key, unescape(raw_value)?),
                AttrKind::Uint => {
                    let value = raw_value.parse::<u64>().map_err(|_| {
                        spec_error(indicator, format!("{key} is not an unsigned integer"))
                    })?;
                    builder.uint(key, value)
                }
                AttrKind::Bytes => {
                    let hex_digits = raw_value.strip_prefix("0x").ok_or_else(|| {
                        spec_error(indicator, format!("{key} must be 0x-prefixed hex"))
                    })?;
                    let bytes = hex::decode(hex_digits)
                        .map_err(|_| spec_error(indicator, format!("{key} is not valid hex")))?;
                    builder.bytes(key, bytes)
                }
            };
        }
        chain = Some(builder.build()?);
    }
    if !any {
        return Err(VfsError::PathSpec {
            reason: "empty comparable form".into(),
        });
    }
    Ok(chain.expect("at least one record was parsed"))
}

/// Split one comparable line at unescaped `, ` boundaries.
fn split_tokens(line: &str) -> Result<Vec<String>, VfsError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            current.push(ch);
            match chars.next() {
                Some(escaped) => current.push(escaped),
                None => {
                    return Err(VfsError::PathSpec {
                        reason: format!("dangling escape in: {line}"),
                    });
                }
            }
        } else if ch == ',' && chars.peek() == Some(&' ') {
            chars.next();
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    tokens.push(current);
    Ok(tokens)
}

fn unescape(value: &str) -> Result<String, VfsError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some(',') => out.push(','),
            Some('n') => out.push('\n'),
            other => {
                return Err(VfsError::PathSpec {
                    reason: format!("invalid escape \\{} in value", other.unwrap_or(' ')),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_requires_location() {
        let err = PathSpec::builder(TypeIndicator::Os).build().unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn system_level_rejects_parent() {
        let err = PathSpec::builder(TypeIndicator::Os)
            .text("location", "/x")
            .parent(PathSpec::os("/y"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no parent"));
    }

    #[test]
    fn nested_type_requires_parent() {
        let err = PathSpec::builder(TypeIndicator::Gzip).build().unwrap_err();
        assert!(err.to_string().contains("requires a parent"));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = PathSpec::builder(TypeIndicator::DataRange)
            .parent(PathSpec::os("/x"))
            .uint("range_offset", 0)
            .uint("range_size", 1)
            .uint("banana", 7)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("banana"));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let err = PathSpec::builder(TypeIndicator::DataRange)
            .parent(PathSpec::os("/x"))
            .text("range_offset", "zero")
            .uint("range_size", 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("wrong kind"));
    }

    #[test]
    fn duplicate_attribute_is_rejected() {
        let err = PathSpec::builder(TypeIndicator::Os)
            .text("location", "/a")
            .text("location", "/b")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn relative_location_below_os_is_rejected() {
        let err = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/a.tar"))
            .text("location", "syslog")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn volume_system_allows_one_addressing_attribute() {
        let ok = PathSpec::builder(TypeIndicator::Gpt)
            .parent(PathSpec::os("/disk.raw"))
            .uint("part_index", 1)
            .build();
        assert!(ok.is_ok());

        let err = PathSpec::builder(TypeIndicator::Gpt)
            .parent(PathSpec::os("/disk.raw"))
            .text("location", "/p1")
            .uint("part_index", 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("at most one"));
    }

    #[test]
    fn sqlite_blob_requires_exactly_one_row_selector() {
        let base = || {
            PathSpec::builder(TypeIndicator::SqliteBlob)
                .parent(PathSpec::os("/db.sqlite"))
                .text("table_name", "cache")
                .text("column_name", "data")
        };
        assert!(base().uint("row_index", 3).build().is_ok());
        assert!(base().text("row_condition", "name = 'x'").build().is_ok());
        assert!(base().build().is_err());
        assert!(
            base()
                .uint("row_index", 3)
                .text("row_condition", "name = 'x'")
                .build()
                .is_err()
        );
    }

    #[test]
    fn parse_rejects_orphan_nested_root() {
        let err = parse("type=GZIP\n").unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let err = parse("type=WHAT\n").unwrap_err();
        assert!(err.to_string().contains("WHAT"));
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(parse("").is_err());
    }

    #[test]
    fn parse_builds_three_record_chain() {
        let spec = parse(
            "type=OS, location=/image.qcow2\ntype=QCOW\ntype=TSK_PARTITION, location=/p1\n",
        )
        .unwrap();
        assert_eq!(spec.indicator(), TypeIndicator::TskPartition);
        assert_eq!(spec.location(), Some("/p1"));
        assert_eq!(spec.parent().unwrap().indicator(), TypeIndicator::Qcow);
        assert_eq!(spec.chain_depth(), 3);
    }
}
