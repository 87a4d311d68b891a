// unibox-linker - merges independent units into one multi-call program

pub mod detector;
pub mod error;
pub mod index;
pub mod initorder;
pub mod loader;
pub mod manifest;
pub mod merge;
pub mod namespace;
pub mod planner;
pub mod reconciler;
pub mod resolve;
pub mod scope;
pub mod source;
pub mod synthesizer;
pub mod typing;
pub mod verify;
pub mod write;

pub use detector::{detect, Collision, HOST_ENTRY};
pub use error::{MergeError, MergeResult, Phase};
pub use index::{DependencyIndex, PackageInfo, RUNTIME_PACKAGE};
pub use loader::{load_unit, load_units, EntrySignature, LoadedUnit};
pub use manifest::{ManifestError, MergeManifest, UnitSpec, MANIFEST_FILE};
pub use merge::{MergeOptions, Merger, PlanReport};
pub use namespace::{AliasKey, FileId, Namespace, SymbolKey};
pub use planner::{plan, Rename, RenamePlan, RenameReason, UnitPlan};
pub use reconciler::{reconcile, AddedImport, ImportPlan};
pub use source::{SourceText, UnitSource};
pub use synthesizer::{synthesize, MergedProgram, REGISTRY_MANIFEST, REGISTRY_SOURCE};
pub use verify::verify;
pub use write::write_program;
