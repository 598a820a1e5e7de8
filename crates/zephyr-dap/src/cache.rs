//! Source/binary cache
//!
//! Resolves qualified script paths to loaded compilation units, indexes each
//! unit's functions by source-line range and bytecode range, and serves
//! script sources back to the client. Units are created lazily on first
//! resolution and populated by a scan over the VM image's namespaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;
use zephyr_vm::{ArchiveFs, ClassDesc, Lump, StructDesc, VmFunction, VmImage};

use crate::protocol::{Checksum, Source};
use crate::ranges::RangeMap;
use crate::refs::{
    archive_of, basename, has_qualifier, is_script_path, qualify, script_reference,
    source_reference, strip_qualifier, ScriptRef,
};

// ── Binary ───────────────────────────────────────────────────────────────────

/// One loaded compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Binary {
    pub script_ref: ScriptRef,
    pub archive_name: String,
    pub archive_path: String,
    /// Basename of the script file.
    pub script_name: String,
    /// Container-relative path.
    pub script_path: String,
    /// The source descriptor handed to the client.
    pub source_data: Source,
    /// Archive lump holding the script bytes, when resolvable.
    pub lump: Option<Lump>,
    /// Functions declared in this unit, keyed by lowercased qualified name.
    pub functions: HashMap<String, Arc<VmFunction>>,
    /// Classes declared in this unit, keyed by lowercased name.
    pub classes: HashMap<String, Arc<ClassDesc>>,
    /// Structs with members in this unit, keyed by lowercased name.
    pub structs: HashMap<String, Arc<StructDesc>>,
    /// Source-line ranges `[firstLine, lastLine+1)` → function.
    pub function_line_map: RangeMap<u32, Arc<VmFunction>>,
    /// Bytecode ranges `[code_start, code_end)` → function.
    pub function_code_map: RangeMap<u64, Arc<VmFunction>>,
}

impl Binary {
    pub fn qualified_path(&self) -> String {
        qualify(&self.archive_name, &self.script_path)
    }

    /// Rebuild the line and code indices from the function table.
    ///
    /// Overlapping line ranges are dropped (mixin-injected duplicates); a
    /// function's code range is only indexed when its line range was.
    pub fn populate_function_maps(&mut self) {
        self.function_line_map.clear();
        self.function_code_map.clear();
        let qualified = self.qualified_path();
        for func in self.functions.values() {
            if func.is_native() || func.is_abstract() {
                continue;
            }
            let declared_here = func
                .source_path
                .as_deref()
                .is_some_and(|sp| sp.eq_ignore_ascii_case(&qualified));
            if !declared_here {
                continue;
            }
            let Some((first, last)) = func.line_span() else {
                continue;
            };
            if !self.function_line_map.insert(first, last + 1, func.clone()) {
                continue;
            }
            self.function_code_map
                .insert(func.code_start, func.code_end(), func.clone());
        }
    }

    /// Function covering a source line, if any.
    pub fn function_at_line(&self, line: u32) -> Option<&Arc<VmFunction>> {
        self.function_line_map.get(line)
    }

    /// Function covering a bytecode address, if any.
    pub fn function_at_pc(&self, pc: u64) -> Option<&Arc<VmFunction>> {
        self.function_code_map.get(pc)
    }
}

// ── BinaryCache ──────────────────────────────────────────────────────────────

/// Cache of loaded compilation units keyed by script reference.
pub struct BinaryCache {
    image: Arc<VmImage>,
    fs: Arc<dyn ArchiveFs>,
    scripts: Mutex<HashMap<ScriptRef, Arc<Binary>>>,
}

impl BinaryCache {
    pub fn new(image: Arc<VmImage>, fs: Arc<dyn ArchiveFs>) -> Self {
        Self {
            image,
            fs,
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_script(&self, script_ref: ScriptRef) -> bool {
        self.scripts.lock().unwrap().contains_key(&script_ref)
    }

    pub fn has_script_path(&self, path: &str) -> bool {
        match self.resolve_qualified(path) {
            Some(qualified) => self.has_script(script_reference(&qualified)),
            None => false,
        }
    }

    /// Cached unit lookup, no scanning.
    pub fn cached(&self, script_ref: ScriptRef) -> Option<Arc<Binary>> {
        self.scripts.lock().unwrap().get(&script_ref).cloned()
    }

    /// Resolve a DAP source to its unit: an authoritative reference first,
    /// then the origin-qualified path.
    pub fn get_script_source(&self, source: &Source) -> Option<Arc<Binary>> {
        if let Some(binary) = self.cached(source_reference(source)) {
            return Some(binary);
        }
        let path = source.path.as_deref()?;
        match source.origin.as_deref() {
            Some(origin) if !origin.is_empty() => self.get_script(&qualify(origin, path)),
            _ => self.get_script(path),
        }
    }

    /// Resolve a possibly-qualified path to its unit, scanning on a miss.
    pub fn get_script(&self, path: &str) -> Option<Arc<Binary>> {
        let qualified = self.resolve_qualified(path)?;
        let script_ref = script_reference(&qualified);
        if let Some(binary) = self.cached(script_ref) {
            return Some(binary);
        }
        self.scan_scripts(Some(&qualified));
        self.cached(script_ref)
    }

    /// Source descriptor for a script path.
    pub fn source_data(&self, path: &str) -> Option<Source> {
        self.get_script(path).map(|b| b.source_data.clone())
    }

    /// Raw script bytes for a DAP source, read back from the archive.
    pub fn decompiled_source(&self, source: &Source) -> Option<Vec<u8>> {
        let binary = self.get_script_source(source)?;
        self.read_script_bytes(&binary)
    }

    /// Raw script bytes for a qualified path.
    pub fn decompiled_source_path(&self, path: &str) -> Option<Vec<u8>> {
        let binary = self.get_script(path)?;
        self.read_script_bytes(&binary)
    }

    /// Every loaded unit's source descriptor, CRC32 checksums attached.
    pub fn loaded_sources(&self) -> Vec<Source> {
        self.scan_scripts(None);
        let scripts = self.scripts.lock().unwrap();
        let mut sources: Vec<Source> = scripts
            .values()
            .map(|binary| {
                let mut source = binary.source_data.clone();
                if let Some(crc) = binary.lump.and_then(|lump| self.fs.file_crc32(lump)) {
                    source.checksums = Some(vec![Checksum {
                        algorithm: "CRC32".to_string(),
                        checksum: crc.to_string(),
                    }]);
                }
                source
            })
            .collect();
        sources.sort_by(|a, b| a.path.cmp(&b.path));
        sources
    }

    pub fn clear(&self) {
        self.scripts.lock().unwrap().clear();
    }

    /// Find `Class.Function` in the VM image, case-insensitively.
    ///
    /// Returns the function together with the qualified path of the script
    /// owning the breakpoint record: the function's own source for script
    /// functions, the declaring class's source for native ones.
    pub fn find_function(
        &self,
        class_name: &str,
        func_name: &str,
    ) -> Option<(Arc<VmFunction>, Option<String>)> {
        if let Some(class) = self.image.find_class(class_name) {
            if let Some(func) = class.find_function(func_name) {
                let record_source = func
                    .source_path
                    .clone()
                    .or_else(|| class.source_path.clone());
                return Some((func, record_source));
            }
        }
        if let Some(st) = self.image.find_struct(class_name) {
            if let Some(func) = st.find_function(func_name) {
                let record_source = func.source_path.clone();
                return Some((func, record_source));
            }
        }
        None
    }

    // ── Resolution helpers ────────────────────────────────────────────────────

    /// Qualify a path with its owning archive, discovering the archive from
    /// the file system when the qualifier is missing.
    fn resolve_qualified(&self, path: &str) -> Option<String> {
        if has_qualifier(path) && archive_of(path).is_some() {
            return Some(path.to_string());
        }
        let relative = strip_qualifier(path);
        let lump = self.fs.find_file(relative)?;
        let container = self.fs.file_container(lump)?;
        let archive = self.fs.container_name(container)?;
        Some(qualify(&archive, relative))
    }

    fn read_script_bytes(&self, binary: &Binary) -> Option<Vec<u8>> {
        let lump = match binary.lump {
            Some(lump) => lump,
            None => self.fs.find_file(&binary.script_path)?,
        };
        self.fs.read_file(lump)
    }

    fn make_empty_binary(&self, qualified_path: &str) -> Binary {
        let relative = strip_qualifier(qualified_path).to_string();
        let lump = self.fs.find_file(&relative);
        let container = lump.and_then(|l| self.fs.file_container(l));
        let archive_name = container
            .and_then(|c| self.fs.container_name(c))
            .or_else(|| archive_of(qualified_path).map(str::to_string))
            .unwrap_or_default();
        let archive_path = container
            .and_then(|c| self.fs.container_path(c))
            .unwrap_or_default();
        let script_name = basename(&relative).to_string();
        let script_ref = script_reference(&qualify(&archive_name, &relative));
        Binary {
            script_ref,
            source_data: Source {
                name: Some(script_name.clone()),
                path: Some(relative.clone()),
                origin: (!archive_name.is_empty()).then(|| archive_name.clone()),
                source_reference: Some(i64::from(script_ref.0)),
                checksums: None,
            },
            archive_name,
            archive_path,
            script_name,
            script_path: relative,
            lump,
            ..Binary::default()
        }
    }

    // ── Scan ─────────────────────────────────────────────────────────────────

    /// Walk the VM image and (re)build units. With a filter, only the script
    /// at that qualified path is indexed; without one, every script file in
    /// the mounted archives is.
    fn scan_scripts(&self, filter: Option<&str>) {
        let mut scripts = self.scripts.lock().unwrap();
        let mut work: HashMap<ScriptRef, Binary> = scripts
            .iter()
            .map(|(r, b)| (*r, (**b).clone()))
            .collect();

        let mut filter_ref = None;
        let mut filter_container = None;
        if let Some(filter) = filter {
            let relative = strip_qualifier(filter);
            let Some(lump) = self.fs.find_file(relative) else {
                return;
            };
            let Some(container) = self.fs.file_container(lump) else {
                return;
            };
            let qualified = if archive_of(filter).is_some() {
                filter.to_string()
            } else {
                match self.fs.container_name(container) {
                    Some(archive) => qualify(&archive, relative),
                    None => return,
                }
            };
            let script_ref = script_reference(&qualified);
            work.entry(script_ref)
                .or_insert_with(|| self.make_empty_binary(&qualified));
            filter_ref = Some(script_ref);
            filter_container = Some(container);
        } else {
            // Full scan: seed a unit for every script file in the archives.
            for lump in 0..self.fs.entry_count() {
                let Some(path) = self.fs.file_full_name(lump) else {
                    continue;
                };
                if !is_script_path(&path) {
                    continue;
                }
                let Some(archive) = self
                    .fs
                    .file_container(lump)
                    .and_then(|c| self.fs.container_name(c))
                else {
                    continue;
                };
                let qualified = qualify(&archive, &path);
                let script_ref = script_reference(&qualified);
                work.entry(script_ref)
                    .or_insert_with(|| self.make_empty_binary(&qualified));
            }
        }

        for ns in &self.image.namespaces {
            if filter_container.is_some() && ns.container != filter_container {
                continue;
            }
            for class in &ns.classes {
                self.index_class(&mut work, class, filter_ref);
            }
            for st in &ns.structs {
                self.index_struct(&mut work, st, filter_ref);
            }
        }

        for binary in work.values_mut() {
            binary.populate_function_maps();
        }
        debug!(units = work.len(), filtered = filter.is_some(), "script scan complete");
        *scripts = work
            .into_iter()
            .map(|(r, b)| (r, Arc::new(b)))
            .collect();
    }

    fn index_class(
        &self,
        work: &mut HashMap<ScriptRef, Binary>,
        class: &Arc<ClassDesc>,
        filter_ref: Option<ScriptRef>,
    ) {
        // Classes without a declaring script are native-only; their script
        // methods still get indexed through the declaring class of record.
        let Some(class_source) = class.source_path.as_deref() else {
            return;
        };
        let class_ref = script_reference(class_source);
        if let Some(filter) = filter_ref {
            if filter != class_ref {
                return;
            }
        }
        work.entry(class_ref)
            .or_insert_with(|| self.make_empty_binary(class_source));
        if let Some(binary) = work.get_mut(&class_ref) {
            binary
                .classes
                .insert(class.name.to_ascii_lowercase(), class.clone());
        }

        for func in &class.functions {
            if func.is_native() {
                continue;
            }
            match func.source_path.as_deref() {
                None => {
                    // Abstract declarations carry no code; record them with
                    // the declaring class.
                    if !func.is_abstract() {
                        continue;
                    }
                    if let Some(binary) = work.get_mut(&class_ref) {
                        binary
                            .functions
                            .insert(func.qualified_name.to_ascii_lowercase(), func.clone());
                    }
                }
                Some(func_source) => {
                    let func_ref = script_reference(func_source);
                    if let Some(filter) = filter_ref {
                        if filter != func_ref {
                            continue;
                        }
                    }
                    work.entry(func_ref)
                        .or_insert_with(|| self.make_empty_binary(func_source));
                    if let Some(binary) = work.get_mut(&func_ref) {
                        binary
                            .functions
                            .insert(func.qualified_name.to_ascii_lowercase(), func.clone());
                    }
                }
            }
        }
    }

    fn index_struct(
        &self,
        work: &mut HashMap<ScriptRef, Binary>,
        st: &Arc<StructDesc>,
        filter_ref: Option<ScriptRef>,
    ) {
        for func in &st.functions {
            if func.is_native() {
                continue;
            }
            let Some(func_source) = func.source_path.as_deref() else {
                continue;
            };
            let func_ref = script_reference(func_source);
            if let Some(filter) = filter_ref {
                if filter != func_ref {
                    continue;
                }
            }
            work.entry(func_ref)
                .or_insert_with(|| self.make_empty_binary(func_source));
            if let Some(binary) = work.get_mut(&func_ref) {
                binary
                    .functions
                    .insert(func.qualified_name.to_ascii_lowercase(), func.clone());
                binary
                    .structs
                    .entry(st.name.to_ascii_lowercase())
                    .or_insert_with(|| st.clone());
            }
        }
    }
}
