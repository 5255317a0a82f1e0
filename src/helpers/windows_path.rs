//! Windows path form normalisation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::vfs::{EntryType, FileSystem};
use crate::VfsError;

/// Normalises the many Windows path forms into a per-file-system location.
///
/// Handled forms:
///
/// | Form | Example |
/// |------|---------|
/// | Drive path | `C:\Windows\System32` |
/// | Native object | `\??\C:\Windows` |
/// | Device | `\\.\C:\Windows` |
/// | Extended | `\\?\C:\Windows` |
/// | UNC | `\\server\share\path` |
/// | Extended UNC | `\\?\UNC\server\share\path` |
/// | Environment variable | `%SystemRoot%\System32` |
/// | Volume GUID | `\VOLUME{deadbeef-...}\path` |
///
/// Resolution applies, in order: environment-variable substitution against
/// the configured map, drive/volume/share lookup against the configured
/// mounts, short-name (8.3) expansion via a cache populated from the target
/// file system, and case-insensitive segment resolution when the target file
/// system declares itself case-insensitive.
pub struct WindowsPathResolver {
    file_system: Option<Arc<dyn FileSystem>>,
    env_vars: HashMap<String, String>,
    /// Uppercased drive letter → location prefix in the target file system.
    drives: HashMap<String, String>,
    /// Lowercased volume GUID (no braces) → location prefix.
    volumes: HashMap<String, String>,
    /// Lowercased `server\share` → location prefix.
    shares: HashMap<String, String>,
    /// Parent location → (uppercased 8.3 prefix → long name).
    short_name_cache: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for WindowsPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowsPathResolver {
    /// A resolver with no mappings and no target file system.
    pub fn new() -> Self {
        Self {
            file_system: None,
            env_vars: HashMap::new(),
            drives: HashMap::new(),
            volumes: HashMap::new(),
            shares: HashMap::new(),
            short_name_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the target file system, enabling short-name expansion and
    /// case-insensitive segment resolution.
    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    /// Define an environment variable for `%VAR%` substitution.
    pub fn set_environment_variable(&mut self, name: &str, value: impl Into<String>) {
        self.env_vars.insert(name.to_uppercase(), value.into());
    }

    /// Map a drive letter onto a location prefix in the target file system.
    pub fn map_drive(&mut self, letter: char, prefix: impl Into<String>) {
        self.drives
            .insert(letter.to_ascii_uppercase().to_string(), prefix.into());
    }

    /// Map a volume GUID onto a location prefix.
    pub fn map_volume(&mut self, guid: &str, prefix: impl Into<String>) {
        self.volumes.insert(guid.to_lowercase(), prefix.into());
    }

    /// Map a UNC `server`, `share` pair onto a location prefix.
    pub fn map_share(&mut self, server: &str, share: &str, prefix: impl Into<String>) {
        self.shares
            .insert(format!("{}\\{}", server.to_lowercase(), share.to_lowercase()), prefix.into());
    }

    /// Normalise `path` into a location in the target file system.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] for an unparsable form, an undefined
    ///   environment variable, or an unmapped drive/volume/share
    /// - [`VfsError::NotFound`] when segment resolution against the target
    ///   file system finds no match
    pub fn resolve(&self, path: &str) -> Result<String, VfsError> {
        let expanded = self.expand_environment(path)?;
        let (prefix, remainder) = self.split_root(&expanded)?;

        let mut segments: Vec<String> = Vec::new();
        for segment in prefix.split('/').chain(remainder.split('\\')) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other.to_string()),
            }
        }

        match &self.file_system {
            Some(file_system) => self.resolve_segments(file_system.as_ref(), &segments),
            None => Ok(format!("/{}", segments.join("/"))),
        }
    }

    fn expand_environment(&self, path: &str) -> Result<String, VfsError> {
        if !path.contains('%') {
            return Ok(path.to_string());
        }
        let mut out = String::new();
        let mut rest = path;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let tail = &rest[start + 1..];
            let Some(end) = tail.find('%') else {
                return Err(VfsError::PathSpec {
                    reason: format!("unterminated environment variable in: {path}"),
                });
            };
            let name = &tail[..end];
            let value =
                self.env_vars
                    .get(&name.to_uppercase())
                    .ok_or_else(|| VfsError::PathSpec {
                        reason: format!("undefined environment variable: %{name}%"),
                    })?;
            out.push_str(value);
            rest = &tail[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Strip the root designator and return (mapped location prefix, rest).
    fn split_root<'path>(&self, path: &'path str) -> Result<(String, &'path str), VfsError> {
        let unprefixed = if let Some(rest) = path.strip_prefix("\\??\\") {
            rest
        } else if let Some(rest) = path.strip_prefix("\\\\?\\UNC\\") {
            return self.split_share(rest, path);
        } else if let Some(rest) = path.strip_prefix("\\\\?\\") {
            rest
        } else if let Some(rest) = path.strip_prefix("\\\\.\\") {
            rest
        } else if let Some(rest) = path.strip_prefix("\\\\") {
            return self.split_share(rest, path);
        } else {
            path
        };

        if let Some(rest) = unprefixed.strip_prefix("\\VOLUME{").or_else(|| {
            unprefixed.strip_prefix("VOLUME{")
        }) {
            let Some(end) = rest.find('}') else {
                return Err(VfsError::PathSpec {
                    reason: format!("unterminated volume identifier in: {path}"),
                });
            };
            let guid = rest[..end].to_lowercase();
            let prefix = self.volumes.get(&guid).ok_or_else(|| VfsError::PathSpec {
                reason: format!("unmapped volume: {{{guid}}}"),
            })?;
            return Ok((prefix.clone(), &rest[end + 1..]));
        }

        let mut chars = unprefixed.chars();
        if let (Some(letter), Some(':')) = (chars.next(), chars.next()) {
            if letter.is_ascii_alphabetic() {
                let key = letter.to_ascii_uppercase().to_string();
                let prefix = self.drives.get(&key).ok_or_else(|| VfsError::PathSpec {
                    reason: format!("unmapped drive: {key}:"),
                })?;
                return Ok((prefix.clone(), &unprefixed[2..]));
            }
        }

        if unprefixed.starts_with('\\') {
            // Rooted in the target file system directly.
            return Ok((String::new(), unprefixed));
        }
        Err(VfsError::PathSpec {
            reason: format!("not an absolute Windows path: {path}"),
        })
    }

    fn split_share<'path>(
        &self,
        rest: &'path str,
        original: &str,
    ) -> Result<(String, &'path str), VfsError> {
        let mut parts = rest.splitn(3, '\\');
        let server = parts.next().unwrap_or("");
        let share = parts.next().unwrap_or("");
        if server.is_empty() || share.is_empty() {
            return Err(VfsError::PathSpec {
                reason: format!("malformed UNC path: {original}"),
            });
        }
        let key = format!("{}\\{}", server.to_lowercase(), share.to_lowercase());
        let prefix = self.shares.get(&key).ok_or_else(|| VfsError::PathSpec {
            reason: format!("unmapped share: \\\\{server}\\{share}"),
        })?;
        Ok((prefix.clone(), parts.next().unwrap_or("")))
    }

    /// Resolve segments against the target file system: exact first, then
    /// short-name expansion, then case-insensitive when the file system
    /// allows it.
    fn resolve_segments(
        &self,
        file_system: &dyn FileSystem,
        segments: &[String],
    ) -> Result<String, VfsError> {
        let case_sensitive = file_system.case_sensitive();
        let mut location = String::new();
        for segment in segments {
            let parent = if location.is_empty() { "/" } else { &location };
            let children = self.directory_names(file_system, parent)?;

            let resolved = children
                .iter()
                .find(|name| name.as_str() == segment)
                .or_else(|| {
                    segment.contains('~').then(|| {
                        let prefix = segment
                            .split('~')
                            .next()
                            .unwrap_or("")
                            .to_uppercase();
                        children.iter().find(|name| {
                            !prefix.is_empty() && name.to_uppercase().starts_with(&prefix)
                        })
                    })?
                })
                .or_else(|| {
                    if case_sensitive {
                        None
                    } else {
                        children
                            .iter()
                            .find(|name| name.eq_ignore_ascii_case(segment))
                    }
                })
                .ok_or_else(|| VfsError::NotFound {
                    location: format!("{parent}: {segment}"),
                })?;

            location.push('/');
            location.push_str(resolved);
        }
        if location.is_empty() {
            location.push('/');
        }
        Ok(location)
    }

    /// Child names of the directory at `location`, navigated from the root
    /// entry so the lookup works on any back-end.
    fn directory_names(
        &self,
        file_system: &dyn FileSystem,
        location: &str,
    ) -> Result<Vec<String>, VfsError> {
        {
            let cache = self.short_name_cache.lock().expect("short name cache lock");
            if let Some(names) = cache.get(location) {
                return Ok(names.clone());
            }
        }
        let mut entry = file_system.root_entry()?;
        for segment in file_system.split_path(location) {
            let mut found = None;
            for child in entry.sub_entries()? {
                let child = child?;
                if child.name() == segment {
                    found = Some(child);
                    break;
                }
            }
            entry = found.ok_or_else(|| VfsError::NotFound {
                location: location.to_string(),
            })?;
        }
        if entry.entry_type() != EntryType::Directory {
            return Err(VfsError::NotFound {
                location: location.to_string(),
            });
        }
        let mut names = Vec::new();
        for child in entry.sub_entries()? {
            names.push(child?.name().to_string());
        }
        let mut cache = self.short_name_cache.lock().expect("short name cache lock");
        cache.insert(location.to_string(), names.clone());
        Ok(names)
    }
}
