// src/project/packages_config.rs

//! Projects that list their packages in a `packages.config` file
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <packages>
//!   <package id="Json" version="1.0.0" targetFramework="net472" allowedVersions="[1.0,2.0)" />
//! </packages>
//! ```
//!
//! Package content is extracted into a packages folder that the project may
//! share with other projects of the solution. Uninstalling only drops the
//! reference; the executor deletes the folder copy once no project uses it.

use super::context::{FileConflictAction, MessageLevel, ProjectContext};
use super::Project;
use crate::error::{Error, Result};
use crate::folder::PackagesFolder;
use crate::framework::TargetFramework;
use crate::packaging::{PackageIdentity, PackageReference};
use crate::protocol::DownloadedPackage;
use crate::restore::write_if_changed;
use crate::version::VersionRange;
use async_trait::async_trait;
use parking_lot::Mutex;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PACKAGES_CONFIG_FILE: &str = "packages.config";

pub struct PackagesConfigProject {
    name: String,
    config_path: PathBuf,
    framework: TargetFramework,
    folder: PackagesFolder,
    write_lock: tokio::sync::Mutex<()>,
    /// Allowed-versions constraints of references removed during an update,
    /// put back when the package id is installed again
    pending_constraints: Mutex<HashMap<String, VersionRange>>,
}

impl PackagesConfigProject {
    pub fn new(
        name: impl Into<String>,
        config_path: impl Into<PathBuf>,
        framework: TargetFramework,
        folder: PackagesFolder,
    ) -> Self {
        Self {
            name: name.into(),
            config_path: config_path.into(),
            framework,
            folder,
            write_lock: tokio::sync::Mutex::new(()),
            pending_constraints: Mutex::new(HashMap::new()),
        }
    }

    /// Project whose `packages.config` lives in `dir`
    pub fn in_directory(
        name: impl Into<String>,
        dir: &Path,
        framework: TargetFramework,
        folder: PackagesFolder,
    ) -> Self {
        Self::new(name, dir.join(PACKAGES_CONFIG_FILE), framework, folder)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn packages_folder(&self) -> &PackagesFolder {
        &self.folder
    }

    fn read_references(&self) -> Result<Vec<PackageReference>> {
        match fs::read_to_string(&self.config_path) {
            Ok(text) => parse_references(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::IoError(format!(
                "Failed to read {}: {e}",
                self.config_path.display()
            ))),
        }
    }

    fn write_references(&self, references: &[PackageReference]) -> Result<()> {
        if references.is_empty() {
            if self.config_path.exists() {
                fs::remove_file(&self.config_path)?;
                debug!("Removed empty {}", self.config_path.display());
            }
            return Ok(());
        }
        write_if_changed(&self.config_path, &render_references(references)?)?;
        Ok(())
    }
}

#[async_trait]
impl Project for PackagesConfigProject {
    fn name(&self) -> &str {
        &self.name
    }

    fn target_frameworks(&self) -> Vec<TargetFramework> {
        vec![self.framework.clone()]
    }

    async fn installed_packages(&self) -> Result<Vec<PackageReference>> {
        self.read_references()
    }

    async fn install_package(
        &self,
        package: &DownloadedPackage,
        context: &dyn ProjectContext,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let identity = package.identity();
        let mut references = self.read_references()?;

        if references.iter().any(|r| &r.identity == identity) {
            context.log(
                MessageLevel::Info,
                &format!("'{}' already exists in project '{}'", identity, self.name),
            );
            return Ok(false);
        }

        if self.folder.package_exists(identity) && !self.folder.has_valid_content(identity) {
            let action = context.resolve_file_conflict(&format!(
                "'{}' in {} does not match the package content",
                identity,
                self.folder.root().display()
            ));
            if matches!(
                action,
                FileConflictAction::Overwrite | FileConflictAction::OverwriteAll
            ) {
                self.folder.delete_package(identity)?;
            }
        }
        self.folder.install(&package.manifest, &package.content).await?;

        let mut reference = PackageReference::new(identity.clone(), self.framework.clone());
        reference.development_dependency = package.manifest.development_dependency;
        reference.allowed_versions = self.pending_constraints.lock().remove(&identity.key());

        references.retain(|r| !r.identity.same_id(identity));
        references.push(reference);
        references.sort_by(|a, b| a.identity.cmp(&b.identity));
        self.write_references(&references)?;

        context.log(
            MessageLevel::Info,
            &format!("Added package '{}' to '{}'", identity, PACKAGES_CONFIG_FILE),
        );
        Ok(true)
    }

    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut references = self.read_references()?;

        let Some(index) = references.iter().position(|r| &r.identity == identity) else {
            return Ok(false);
        };
        let removed = references.remove(index);
        if let Some(allowed) = removed.allowed_versions {
            self.pending_constraints.lock().insert(identity.key(), allowed);
        }
        self.write_references(&references)?;

        context.log(
            MessageLevel::Info,
            &format!("Removed package '{}' from '{}'", identity, PACKAGES_CONFIG_FILE),
        );
        Ok(true)
    }
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::ParseError(format!("{PACKAGES_CONFIG_FILE}: {e}"))
}

/// Parse the `<package>` entries of a packages.config document
pub fn parse_references(text: &str) -> Result<Vec<PackageReference>> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut references: Vec<PackageReference> = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) | Event::Empty(element)
                if element.name().as_ref() == b"package" =>
            {
                let reference = parse_package_element(&element)?;
                if references.iter().any(|r| r.identity.same_id(&reference.identity)) {
                    return Err(Error::ParseError(format!(
                        "{PACKAGES_CONFIG_FILE} lists '{}' more than once",
                        reference.id()
                    )));
                }
                references.push(reference);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(references)
}

fn parse_package_element(element: &BytesStart<'_>) -> Result<PackageReference> {
    let mut id = None;
    let mut version = None;
    let mut framework = None;
    let mut allowed = None;
    let mut development = false;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
        match attribute.key.as_ref() {
            b"id" => id = Some(value),
            b"version" => version = Some(value),
            b"targetFramework" => framework = Some(TargetFramework::parse(&value)?),
            b"allowedVersions" => allowed = Some(VersionRange::parse(&value)?),
            b"developmentDependency" => development = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    let (Some(id), Some(version)) = (id, version) else {
        return Err(Error::ParseError(format!(
            "{PACKAGES_CONFIG_FILE}: <package> needs id and version"
        )));
    };

    let mut reference = PackageReference::new(
        PackageIdentity::parse(&id, &version)?,
        framework.unwrap_or_else(TargetFramework::any),
    );
    reference.allowed_versions = allowed;
    reference.development_dependency = development;
    Ok(reference)
}

/// Render references as a packages.config document
pub fn render_references(references: &[PackageReference]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("packages")))
        .map_err(xml_error)?;

    for reference in references {
        let version = reference.identity.version.to_normalized_string();
        let framework = reference.target_framework.to_string();
        let allowed = reference.allowed_versions.as_ref().map(|r| r.to_string());

        let mut element = BytesStart::new("package");
        element.push_attribute(("id", reference.id()));
        element.push_attribute(("version", version.as_str()));
        element.push_attribute(("targetFramework", framework.as_str()));
        if let Some(allowed) = &allowed {
            element.push_attribute(("allowedVersions", allowed.as_str()));
        }
        if reference.development_dependency {
            element.push_attribute(("developmentDependency", "true"));
        }
        writer.write_event(Event::Empty(element)).map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("packages")))
        .map_err(xml_error)?;

    let mut data = writer.into_inner();
    data.push(b'\n');
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::PackageManifest;
    use crate::project::context::RecordingProjectContext;
    use tempfile::TempDir;

    fn project(temp: &TempDir) -> PackagesConfigProject {
        PackagesConfigProject::in_directory(
            "Legacy",
            &temp.path().join("Legacy"),
            TargetFramework::parse("net472").unwrap(),
            PackagesFolder::new(temp.path().join("packages")),
        )
    }

    fn package(id: &str, version: &str) -> DownloadedPackage {
        DownloadedPackage {
            manifest: PackageManifest::new(PackageIdentity::parse(id, version).unwrap()),
            content: format!("{id} {version}").into_bytes(),
            source: "feed".to_string(),
        }
    }

    #[test]
    fn test_parse_references() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<packages>
  <package id="Json" version="1.0" targetFramework="net472" allowedVersions="[1.0,2.0)" />
  <package id="Tools" version="2.1.0-beta" targetFramework="net472" developmentDependency="true" />
</packages>"#;

        let references = parse_references(xml).unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].identity.to_string(), "Json 1.0.0");
        assert!(references[0].allowed_versions.as_ref().unwrap().satisfies(&"1.5".parse().unwrap()));
        assert!(references[1].development_dependency);
        assert!(references.iter().all(|r| r.user_installed));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let xml = r#"<packages><package id="A" version="1.0" /><package id="a" version="2.0" /></packages>"#;
        assert!(parse_references(xml).is_err());
    }

    #[test]
    fn test_render_then_parse() {
        let reference = PackageReference::new(
            PackageIdentity::parse("Json", "1.0").unwrap(),
            TargetFramework::parse("net472").unwrap(),
        )
        .with_allowed_versions(VersionRange::parse("[1.0,2.0)").unwrap());

        let data = render_references(std::slice::from_ref(&reference)).unwrap();
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains(r#"id="Json""#));
        assert_eq!(parse_references(&text).unwrap(), vec![reference]);
    }

    #[tokio::test]
    async fn test_install_and_uninstall() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        let ctx = RecordingProjectContext::new();
        let a = package("A", "1.0");

        assert!(project.install_package(&a, &ctx).await.unwrap());
        assert!(!project.install_package(&a, &ctx).await.unwrap());
        assert!(project.config_path().exists());
        assert!(project.packages_folder().package_exists(a.identity()));

        let installed = project.installed_identities().await.unwrap();
        assert_eq!(installed, vec![a.identity().clone()]);

        assert!(project.uninstall_package(a.identity(), &ctx).await.unwrap());
        assert!(!project.uninstall_package(a.identity(), &ctx).await.unwrap());
        // Deletion of the folder copy is left to the executor
        assert!(project.packages_folder().package_exists(a.identity()));
        assert!(!project.config_path().exists());
    }

    #[tokio::test]
    async fn test_update_keeps_allowed_versions() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp);
        fs::create_dir_all(temp.path().join("Legacy")).unwrap();
        fs::write(
            project.config_path(),
            r#"<packages><package id="A" version="1.0" targetFramework="net472" allowedVersions="[1.0,3.0)" /></packages>"#,
        )
        .unwrap();
        let ctx = RecordingProjectContext::new();

        let old = PackageIdentity::parse("A", "1.0").unwrap();
        project.uninstall_package(&old, &ctx).await.unwrap();
        project.install_package(&package("A", "2.0"), &ctx).await.unwrap();

        let references = project.installed_packages().await.unwrap();
        assert_eq!(references[0].identity.version.to_string(), "2.0.0");
        assert!(references[0].allowed_versions.is_some());
    }
}
