use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::components::Animation;
use crate::types::{EntityType, ResourceType, Size, UnitAction};

use super::database::{BuildingArchetype, DefDatabase, ResourceArchetype, UnitArchetype};

pub const BUILTIN_DEFS_PATH: &str = "assets/base/entity_defs.xml";
const BUILTIN_DEFS: &str = include_str!("../../../../assets/base/entity_defs.xml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
enum PendingDef {
    Unit(UnitArchetype),
    Building(BuildingArchetype),
    Resource(ResourceArchetype),
}

impl PendingDef {
    fn entity_type(&self) -> EntityType {
        match self {
            PendingDef::Unit(def) => def.entity_type,
            PendingDef::Building(def) => def.entity_type,
            PendingDef::Resource(def) => def.entity_type,
        }
    }
}

/// The definitions shipped with the engine.
pub fn builtin_def_database() -> Result<DefDatabase, ContentCompileError> {
    compile_def_database(Path::new(BUILTIN_DEFS_PATH), BUILTIN_DEFS)
}

pub fn load_def_database(file_path: &Path) -> Result<DefDatabase, ContentCompileError> {
    let raw = fs::read_to_string(file_path).map_err(|source| ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        file_path: file_path.to_path_buf(),
        location: None,
    })?;
    compile_def_database(file_path, &raw)
}

/// Compiles a `<Defs>` document. `file_path` is only used for error reporting.
pub fn compile_def_database(
    file_path: &Path,
    raw: &str,
) -> Result<DefDatabase, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut seen = HashSet::<EntityType>::new();
    let mut units = Vec::new();
    let mut buildings = Vec::new();
    let mut resources = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        let mut fields = FieldReader::new(file_path, &doc, child)?;
        let def = match child.tag_name().name() {
            "UnitDef" => PendingDef::Unit(parse_unit_def(&mut fields)?),
            "BuildingDef" => PendingDef::Building(parse_building_def(&mut fields)?),
            "ResourceDef" => PendingDef::Resource(parse_resource_def(&mut fields)?),
            other => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected <UnitDef>, <BuildingDef> or <ResourceDef>"
                    ),
                    file_path,
                    &doc,
                    child,
                ))
            }
        };
        fields.finish()?;

        if !seen.insert(def.entity_type()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateDef,
                format!("duplicate definition for {:?}", def.entity_type()),
                file_path,
                &doc,
                child,
            ));
        }
        match def {
            PendingDef::Unit(def) => units.push(def),
            PendingDef::Building(def) => buildings.push(def),
            PendingDef::Resource(def) => resources.push(def),
        }
    }

    Ok(DefDatabase::from_defs(units, buildings, resources))
}

fn parse_unit_def(fields: &mut FieldReader<'_, '_, '_>) -> Result<UnitArchetype, ContentCompileError> {
    let entity_type = fields.def_name(EntityType::is_unit, "a unit type")?;
    let animations = match fields.take("animations") {
        Some(node) => parse_animations(fields, node)?,
        None => BTreeMap::new(),
    };
    Ok(UnitArchetype {
        entity_type,
        label: fields.required_text("label")?,
        speed: fields.non_negative("speed")?,
        line_of_sight: fields.non_negative("lineOfSight")?,
        collision_radius: fields.non_negative("collisionRadius")?,
        hit_points: fields.required_number("hitPoints")?,
        gather_speed: fields.optional_non_negative("gatherSpeed")?.unwrap_or(0.0),
        carry_capacity: fields.optional_number("carryCapacity")?.unwrap_or(0),
        attack_damage_per_second: fields
            .optional_non_negative("attackDamagePerSecond")?
            .unwrap_or(0.0),
        repair_per_second: fields.optional_non_negative("repairPerSecond")?.unwrap_or(0.0),
        animations,
    })
}

fn parse_building_def(
    fields: &mut FieldReader<'_, '_, '_>,
) -> Result<BuildingArchetype, ContentCompileError> {
    let entity_type = fields.def_name(EntityType::is_building, "a building type")?;
    let width: i32 = fields.required_number("width")?;
    let height: i32 = fields.required_number("height")?;
    if !(1..=crate::map::MAX_STATIC_ENTITY_TILE_SIZE).contains(&width)
        || !(1..=crate::map::MAX_STATIC_ENTITY_TILE_SIZE).contains(&height)
    {
        return Err(fields.invalid(format!(
            "building size {width}x{height} must be between 1 and {} tiles per side",
            crate::map::MAX_STATIC_ENTITY_TILE_SIZE
        )));
    }
    Ok(BuildingArchetype {
        entity_type,
        label: fields.required_text("label")?,
        size: Size::new(width, height),
        line_of_sight: fields.non_negative("lineOfSight")?,
        hit_points: fields.required_number("hitPoints")?,
        build_time_ms: fields.optional_number("buildTime")?.unwrap_or(0),
    })
}

fn parse_resource_def(
    fields: &mut FieldReader<'_, '_, '_>,
) -> Result<ResourceArchetype, ContentCompileError> {
    let entity_type = fields.def_name(EntityType::is_resource, "a resource type")?;
    let raw_type = fields.required_text("resourceType")?;
    let Some(resource_type) = ResourceType::parse(&raw_type) else {
        return Err(fields.invalid(format!(
            "invalid resourceType '{raw_type}'; allowed values: Wood, Food, Gold, Stone"
        )));
    };
    Ok(ResourceArchetype {
        entity_type,
        label: fields.required_text("label")?,
        resource_type,
        amount: fields.required_number("amount")?,
        collision_radius: fields.non_negative("collisionRadius")?,
    })
}

fn parse_animations(
    fields: &FieldReader<'_, '_, '_>,
    node: Node<'_, '_>,
) -> Result<BTreeMap<UnitAction, Animation>, ContentCompileError> {
    let mut animations = BTreeMap::new();
    for item in node.children().filter(|child| child.is_element()) {
        if item.tag_name().name() != "li" {
            return Err(fields.error_at(
                ContentErrorCode::UnknownField,
                format!("unknown element <{}> in <animations>", item.tag_name().name()),
                item,
            ));
        }
        let raw_action = item.attribute("action").unwrap_or_default();
        let Some(action) = UnitAction::parse(raw_action) else {
            return Err(fields.error_at(
                ContentErrorCode::InvalidValue,
                format!("invalid animation action '{raw_action}'"),
                item,
            ));
        };
        let frames = attribute_number::<u16>(fields, item, "frames")?;
        let speed = attribute_number::<u16>(fields, item, "speed")?;
        let repeatable = match item.attribute("repeatable").unwrap_or("true") {
            "true" => true,
            "false" => false,
            other => {
                return Err(fields.error_at(
                    ContentErrorCode::InvalidValue,
                    format!("repeatable '{other}' must be true or false"),
                    item,
                ))
            }
        };
        if frames == 0 {
            return Err(fields.error_at(
                ContentErrorCode::InvalidValue,
                "animation frames must be >= 1".to_string(),
                item,
            ));
        }
        if animations
            .insert(
                action,
                Animation {
                    frames,
                    speed,
                    repeatable,
                },
            )
            .is_some()
        {
            return Err(fields.error_at(
                ContentErrorCode::DuplicateField,
                format!("duplicate animation for action {action:?}"),
                item,
            ));
        }
    }
    Ok(animations)
}

fn attribute_number<T: FromStr>(
    fields: &FieldReader<'_, '_, '_>,
    node: Node<'_, '_>,
    name: &str,
) -> Result<T, ContentCompileError> {
    let Some(raw) = node.attribute(name) else {
        return Err(fields.error_at(
            ContentErrorCode::MissingField,
            format!("missing attribute '{name}'"),
            node,
        ));
    };
    raw.trim().parse::<T>().map_err(|_| {
        fields.error_at(
            ContentErrorCode::InvalidValue,
            format!("{name} '{raw}' is not a valid number"),
            node,
        )
    })
}

/// Field lookup over one def element. Every field must be consumed exactly once.
struct FieldReader<'p, 'a, 'input> {
    file_path: &'p Path,
    doc: &'a Document<'input>,
    def: Node<'a, 'input>,
    fields: BTreeMap<String, Node<'a, 'input>>,
    last_field: Option<Node<'a, 'input>>,
}

impl<'p, 'a, 'input> FieldReader<'p, 'a, 'input> {
    fn new(
        file_path: &'p Path,
        doc: &'a Document<'input>,
        def: Node<'a, 'input>,
    ) -> Result<Self, ContentCompileError> {
        let mut fields = BTreeMap::new();
        for field in def.children().filter(|child| child.is_element()) {
            let field_name = field.tag_name().name().to_string();
            if fields.insert(field_name.clone(), field).is_some() {
                return Err(error_at_node(
                    ContentErrorCode::DuplicateField,
                    format!(
                        "duplicate field <{}> in <{}>",
                        field_name,
                        def.tag_name().name()
                    ),
                    file_path,
                    doc,
                    field,
                ));
            }
        }
        Ok(Self {
            file_path,
            doc,
            def,
            fields,
            last_field: None,
        })
    }

    fn take(&mut self, name: &str) -> Option<Node<'a, 'input>> {
        let node = self.fields.remove(name);
        if node.is_some() {
            self.last_field = node;
        }
        node
    }

    fn def_name(
        &mut self,
        accepts: fn(EntityType) -> bool,
        expected: &str,
    ) -> Result<EntityType, ContentCompileError> {
        let raw = self.required_text("defName")?;
        match EntityType::parse(&raw) {
            Some(entity_type) if accepts(entity_type) => Ok(entity_type),
            _ => Err(self.invalid(format!("defName '{raw}' is not {expected}"))),
        }
    }

    fn required_text(&mut self, name: &str) -> Result<String, ContentCompileError> {
        match self.optional_text(name)? {
            Some(value) => Ok(value),
            None => Err(self.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required field <{}> in <{}>",
                    name,
                    self.def.tag_name().name()
                ),
                self.def,
            )),
        }
    }

    fn optional_text(&mut self, name: &str) -> Result<Option<String>, ContentCompileError> {
        let Some(node) = self.take(name) else {
            return Ok(None);
        };
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{name}> must not be empty"),
                node,
            ));
        }
        Ok(Some(value))
    }

    fn optional_number<T: FromStr>(&mut self, name: &str) -> Result<Option<T>, ContentCompileError> {
        let Some(raw) = self.optional_text(name)? else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| self.invalid(format!("{name} '{raw}' is not a valid number")))
    }

    fn required_number<T: FromStr>(&mut self, name: &str) -> Result<T, ContentCompileError> {
        match self.optional_number(name)? {
            Some(value) => Ok(value),
            None => Err(self.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required field <{}> in <{}>",
                    name,
                    self.def.tag_name().name()
                ),
                self.def,
            )),
        }
    }

    fn optional_non_negative(&mut self, name: &str) -> Result<Option<f32>, ContentCompileError> {
        let value = self.optional_number::<f32>(name)?;
        match value {
            Some(parsed) if !parsed.is_finite() || parsed < 0.0 => {
                Err(self.invalid(format!("{name} must be finite and >= 0")))
            }
            other => Ok(other),
        }
    }

    fn non_negative(&mut self, name: &str) -> Result<f32, ContentCompileError> {
        match self.optional_non_negative(name)? {
            Some(value) => Ok(value),
            None => Err(self.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required field <{}> in <{}>",
                    name,
                    self.def.tag_name().name()
                ),
                self.def,
            )),
        }
    }

    /// Invalid value reported at the field read last.
    fn invalid(&self, message: String) -> ContentCompileError {
        self.error_at(
            ContentErrorCode::InvalidValue,
            message,
            self.last_field.unwrap_or(self.def),
        )
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        error_at_node(code, message, self.file_path, self.doc, node)
    }

    /// Rejects fields that no parser consumed.
    fn finish(self) -> Result<(), ContentCompileError> {
        match self.fields.into_iter().next() {
            Some((name, node)) => Err(error_at_node(
                ContentErrorCode::UnknownField,
                format!("unknown field <{}> in <{}>", name, self.def.tag_name().name()),
                self.file_path,
                self.doc,
                node,
            )),
            None => Ok(()),
        }
    }
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn compile(raw: &str) -> Result<DefDatabase, ContentCompileError> {
        compile_def_database(Path::new("defs.xml"), raw)
    }

    #[test]
    fn builtin_defs_compile() {
        let db = builtin_def_database().expect("builtin defs");
        let villager = db.unit(EntityType::Villager).expect("villager");
        assert!(villager.can_gather());
        assert!(villager.animations.contains_key(&UnitAction::Chopping));
        let house = db.building(EntityType::House).expect("house");
        assert_eq!(house.size, Size::new(2, 2));
        let tree = db.resource(EntityType::Tree).expect("tree");
        assert_eq!(tree.resource_type, ResourceType::Wood);
        assert!(db.unit(EntityType::Militia).is_some_and(|militia| !militia.can_gather()));
    }

    #[test]
    fn missing_field_reports_file_and_location() {
        let err = compile(
            r#"<Defs><ResourceDef><defName>Tree</defName><label>Tree</label><amount>5</amount><collisionRadius>4</collisionRadius></ResourceDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err.file_path.ends_with("defs.xml"));
        assert!(err.location.is_some());
        assert!(err.message.contains("resourceType"));
    }

    #[test]
    fn unknown_field_errors() {
        let err = compile(
            r#"<Defs><BuildingDef><defName>House</defName><label>H</label><width>2</width><height>2</height><lineOfSight>1</lineOfSight><hitPoints>1</hitPoints><mood>Happy</mood></BuildingDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownField);
        assert!(err.message.contains("mood"));
    }

    #[test]
    fn duplicate_field_errors() {
        let err = compile(
            r#"<Defs><ResourceDef><defName>Tree</defName><defName>Tree</defName></ResourceDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateField);
    }

    #[test]
    fn def_name_must_match_def_kind() {
        let err = compile(
            r#"<Defs><ResourceDef><defName>Villager</defName><label>V</label><resourceType>Wood</resourceType><amount>1</amount><collisionRadius>1</collisionRadius></ResourceDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn negative_speed_is_rejected() {
        let err = compile(
            r#"<Defs><UnitDef><defName>Militia</defName><label>M</label><speed>-3</speed><lineOfSight>1</lineOfSight><collisionRadius>1</collisionRadius><hitPoints>1</hitPoints></UnitDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
        assert!(err.message.contains("speed"));
    }

    #[test]
    fn unknown_def_type_errors() {
        let err = compile(r#"<Defs><ThingDef/></Defs>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownDefType);
    }

    #[test]
    fn invalid_root_errors() {
        let err = compile(r#"<Things/>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidRoot);
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = compile(r#"<Defs><UnitDef><defName>a</defName></Defs>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn duplicate_def_errors() {
        let tree = r#"<ResourceDef><defName>Tree</defName><label>T</label><resourceType>Wood</resourceType><amount>1</amount><collisionRadius>1</collisionRadius></ResourceDef>"#;
        let err = compile(&format!("<Defs>{tree}{tree}</Defs>")).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateDef);
    }

    #[test]
    fn bad_animation_action_errors() {
        let err = compile(
            r#"<Defs><UnitDef><defName>Militia</defName><label>M</label><speed>1</speed><lineOfSight>1</lineOfSight><collisionRadius>1</collisionRadius><hitPoints>1</hitPoints>
                <animations><li action="Dancing" frames="2" speed="2" /></animations></UnitDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("defs.xml");
        fs::write(
            &path,
            r#"<Defs><BuildingDef><defName>House</defName><label>H</label><width>2</width><height>2</height><lineOfSight>512</lineOfSight><hitPoints>150</hitPoints></BuildingDef></Defs>"#,
        )
        .expect("write");
        let db = load_def_database(&path).expect("load");
        let house = db.building(EntityType::House).expect("house");
        assert_eq!(house.build_time_ms, 0);
        assert_eq!(db.def_count(), 1);

        let err = load_def_database(&temp.path().join("missing.xml")).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::ReadFile);
    }
}
