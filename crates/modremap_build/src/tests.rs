use super::*;
use crate::archive::{entry_names, read_entry, OutputSink};
use crate::classfile::tests::ClassBuilder;
use crate::classfile::ClassFile;
use modremap_pm::{ExternalDependency, PlatformArtifacts, Project};
use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use zip::write::FileOptions;
use zip::ZipWriter;

const MAPPINGS: &str = "v1\tofficial\tintermediary\tnamed\n\
    CLASS\ta\tnet/x/abc\tnet/x/Foo\n\
    METHOD\ta\t()V\tb\tmethod_1\ttick\n";

const MIXIN_CONFIG: &[u8] =
    br#"{"required":true,"package":"net.mod.mixin","refmap":"mod-refmap.json","mixins":["MixinA"]}"#;

const REFMAP: &[u8] = br#"{"mappings":{"net/mod/mixin/MixinA":{"update":"Lnet/x/abc;method_1()V"}},"data":{"named:intermediary":{"net/mod/mixin/MixinA":{"update":"Lnet/x/abc;method_1()V"}}}}"#;

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(File::create(path).expect("create jar"));
    for (name, bytes) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start entry");
        writer.write_all(bytes).expect("write entry");
    }
    writer.finish().expect("finish jar");
}

fn mod_class() -> Vec<u8> {
    ClassBuilder::new("net/mod/A", "java/lang/Object")
        .method_ref("net/x/abc", "method_1", "()V")
        .build()
}

/// Project model plus recorded lifecycle notices.
struct RecordingContext {
    project: Project,
    notices: RefCell<Vec<String>>,
}

impl RecordingContext {
    fn new(dir: &Path) -> Self {
        fs::write(dir.join("mappings.tiny"), MAPPINGS).expect("write mappings");
        let platform = dir.join("platform.jar");
        let platform_class = ClassBuilder::new("net/x/abc", "java/lang/Object").build();
        write_jar(&platform, &[("net/x/abc.class", &platform_class)]);

        let project = Project::new(dir)
            .with_mappings(dir.join("mappings.tiny"))
            .with_platform(PlatformArtifacts {
                artifact: platform,
                dependencies: vec![dir.join("missing-lib.jar")],
            });
        Self {
            project,
            notices: RefCell::new(Vec::new()),
        }
    }

    fn notices(&self) -> Vec<String> {
        self.notices.borrow().clone()
    }
}

impl BuildContext for RecordingContext {
    fn configuration_files(&self, name: &str) -> Result<Vec<PathBuf>, ProjectError> {
        self.project.configuration_files(name)
    }

    fn add_file(&mut self, configuration: &str, path: &Path) -> Result<bool, ProjectError> {
        BuildContext::add_file(&mut self.project, configuration, path)
    }

    fn add_dependency(
        &mut self,
        configuration: &str,
        dependency: ExternalDependency,
    ) -> Result<bool, ProjectError> {
        self.project.add_dependency(configuration, dependency)
    }

    fn has_repository(&self, url: &str) -> bool {
        self.project.has_repository(url)
    }

    fn add_repository(&mut self, url: &str) -> Result<bool, ProjectError> {
        self.project.add_repository(url)
    }

    fn platform_artifact(&self) -> &Path {
        BuildContext::platform_artifact(&self.project)
    }

    fn platform_dependencies(&self) -> &[PathBuf] {
        BuildContext::platform_dependencies(&self.project)
    }

    fn mappings_path(&self) -> &Path {
        self.project.mappings_path()
    }

    fn lifecycle(&self, message: &str) {
        self.notices.borrow_mut().push(message.to_string());
    }
}

/// Counts releases of a wrapped [`ClassRemapper`].
#[derive(Default)]
struct CountingRemapper {
    inner: ClassRemapper,
    releases: usize,
}

impl Remapper for CountingRemapper {
    fn configure(
        &mut self,
        mappings: &MappingTable,
        from: &str,
        to: &str,
    ) -> Result<(), TransformError> {
        self.inner.configure(mappings, from, to)
    }

    fn register_root(&mut self, root: &Path) -> Result<(), TransformError> {
        self.inner.register_root(root)
    }

    fn apply(&mut self, input: &Path, sink: &mut OutputSink) -> Result<usize, TransformError> {
        self.inner.apply(input, sink)
    }

    fn map_class_name(&self, name: &str) -> Option<String> {
        self.inner.map_class_name(name)
    }

    fn release(&mut self) {
        self.releases += 1;
        self.inner.release();
    }
}

#[test]
fn handle_mod_rewrites_classes_and_keeps_resources() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let input = dir.path().join("mod.jar");
    let output = dir.path().join("out/mod-named.jar");
    write_jar(
        &input,
        &[("net/mod/A.class", &mod_class()), ("pack.json", b"{\"pack\":{}}")],
    );

    let processor = ModProcessor::new(RemapSettings::default());
    let outcome = processor.handle_mod(&input, &output, &mut ctx).unwrap();

    assert_eq!(outcome.classes, 1);
    assert!(!outcome.refmaps_rewritten);
    assert_eq!(outcome.metadata, None);
    assert_eq!(
        read_entry(&output, "pack.json").unwrap(),
        Some(b"{\"pack\":{}}".to_vec())
    );

    let class_bytes = read_entry(&output, "net/mod/A.class").unwrap().expect("class entry");
    let class = ClassFile::parse(&class_bytes).unwrap();
    let classes = class.referenced_classes();
    assert!(classes.contains(&"net/x/Foo"));
    assert!(!classes.contains(&"net/x/abc"));

    assert_eq!(
        ctx.notices(),
        vec![":remapping mod.jar (ClassRemapper, intermediary -> named)".to_string()]
    );
}

#[test]
fn reference_maps_are_rewritten_and_released_twice() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let input = dir.path().join("mixins.jar");
    let output = dir.path().join("mixins-named.jar");
    write_jar(
        &input,
        &[
            ("net/mod/A.class", &mod_class()),
            ("mod.mixins.json", MIXIN_CONFIG),
            ("mod-refmap.json", REFMAP),
        ],
    );

    let processor = ModProcessor::new(RemapSettings::default());
    let mut remapper = CountingRemapper::default();
    let outcome = processor
        .handle_mod_with(&mut remapper, &input, &output, &mut ctx)
        .unwrap();

    assert!(outcome.refmaps_rewritten);
    assert_eq!(remapper.releases, 2);
    assert_eq!(
        ctx.notices(),
        vec![
            ":remapping mixins.jar (ClassRemapper, intermediary -> named)".to_string(),
            ":remapping mixins.jar (Mixin reference maps)".to_string(),
        ]
    );

    let refmap: serde_json::Value =
        serde_json::from_slice(&read_entry(&output, "mod-refmap.json").unwrap().unwrap()).unwrap();
    assert_eq!(
        refmap["mappings"]["net/mod/mixin/MixinA"]["update"],
        "Lnet/x/Foo;method_1()V"
    );
    assert_eq!(
        refmap["data"]["named:intermediary"]["net/mod/mixin/MixinA"]["update"],
        "Lnet/x/Foo;method_1()V"
    );
    assert_eq!(
        read_entry(&output, "mod.mixins.json").unwrap(),
        Some(MIXIN_CONFIG.to_vec())
    );
}

#[test]
fn without_reference_maps_the_engine_is_released_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let input = dir.path().join("plain.jar");
    let output = dir.path().join("plain-named.jar");
    write_jar(&input, &[("net/mod/A.class", &mod_class())]);

    let processor = ModProcessor::new(RemapSettings::default());
    let mut remapper = CountingRemapper::default();
    processor
        .handle_mod_with(&mut remapper, &input, &output, &mut ctx)
        .unwrap();

    assert_eq!(remapper.releases, 1);
    assert_eq!(ctx.notices().len(), 1);
}

#[test]
fn installer_metadata_extends_the_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let input = dir.path().join("lib-mod.jar");
    let output = dir.path().join("lib-mod-named.jar");
    write_jar(
        &input,
        &[(
            INSTALLER_METADATA_ENTRY,
            br#"{"libraries":{"common":[{"name":"g:a:1.0","url":"http://repo.example/"}]}}"#,
        )],
    );

    let processor = ModProcessor::new(RemapSettings::default());
    let outcome = processor.handle_mod(&input, &output, &mut ctx).unwrap();

    assert_eq!(
        outcome.metadata,
        Some(AppliedMetadata {
            dependencies: 1,
            repositories: 1
        })
    );
    let compile = ctx.project.configuration("compile").unwrap();
    assert_eq!(compile.dependencies()[0].coordinates.to_string(), "g:a:1.0");
    assert!(!compile.dependencies()[0].transitive);
    assert!(ctx.project.repositories().contains_url("http://repo.example"));
}

#[test]
fn unreadable_installer_metadata_does_not_abort_remapping() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let input = dir.path().join("broken.jar");
    let output = dir.path().join("broken-named.jar");
    write_jar(&input, &[(INSTALLER_METADATA_ENTRY, b"{ not json")]);

    let processor = ModProcessor::new(RemapSettings::default());
    let outcome = processor.handle_mod(&input, &output, &mut ctx).unwrap();

    assert_eq!(outcome.metadata, None);
    assert!(output.exists());
}

#[test]
fn configuration_outputs_are_registered_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    let first = dir.path().join("first-1.0.jar");
    let second = dir.path().join("second.jar");
    write_jar(&first, &[("net/mod/A.class", &mod_class())]);
    write_jar(&second, &[("readme.txt", b"second")]);
    for path in [&first, &second] {
        ctx.project
            .configuration_mut("modCompile")
            .unwrap()
            .add_file(path.clone());
    }

    let out_dir = dir.path().join("remapped");
    let processor = ModProcessor::new(RemapSettings::default());

    let outcome = processor.remap_configuration(&mut ctx, &out_dir).unwrap();
    assert_eq!(outcome.remapped.len(), 2);
    assert!(outcome.up_to_date.is_empty());
    assert_eq!(
        outcome.remapped[0].output,
        out_dir.join("first-1.0-named.jar")
    );

    let again = processor.remap_configuration(&mut ctx, &out_dir).unwrap();
    assert!(again.remapped.is_empty());
    assert_eq!(again.up_to_date.len(), 2);

    let mapped = ctx.project.configuration("modCompileMapped").unwrap();
    assert_eq!(
        mapped.files(),
        &[
            out_dir.join("first-1.0-named.jar"),
            out_dir.join("second-named.jar")
        ]
    );
    assert_eq!(
        entry_names(&out_dir.join("first-1.0-named.jar")).unwrap(),
        vec!["net/mod/A.class"]
    );
}

#[test]
fn mapping_table_is_loaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RecordingContext::new(dir.path());
    let processor = ModProcessor::new(RemapSettings::default());

    let first = processor.mappings(&ctx).unwrap();
    fs::remove_file(dir.path().join("mappings.tiny")).unwrap();
    let second = processor.mappings(&ctx).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn missing_mappings_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = RecordingContext::new(dir.path());
    ctx.project = Project::new(dir.path()).with_mappings(dir.path().join("absent.tiny"));
    let input = dir.path().join("mod.jar");
    write_jar(&input, &[("pack.json", b"{}")]);

    let processor = ModProcessor::new(RemapSettings::default());
    let error = processor
        .handle_mod(&input, &dir.path().join("out.jar"), &mut ctx)
        .unwrap_err();
    assert!(matches!(error, ProcessError::Mappings(MappingError::Io { .. })));
}

#[test]
fn settings_follow_project_config() {
    let config = modremap_pm::ProjectConfig::from_toml_str(
        "[remap]\nfrom = \"official\"\nto = \"intermediary\"\nremapped-configuration = \"mapped\"\n",
    )
    .unwrap();
    let settings = RemapSettings::from_config(&config);
    assert_eq!(settings.from, "official");
    assert_eq!(settings.to, "intermediary");
    assert_eq!(settings.remapped_configuration, "mapped");
    assert_eq!(settings.mod_configuration, "modCompile");
    assert_eq!(remapped_file_name(Path::new("mods/foo-1.0.jar"), "named"), "foo-1.0-named.jar");
}
