//! Hierarchy reconstruction for CRT category columns.
//!
//! Every row's label is parsed into a [`CategoryNode`], un-numbered prose rows
//! inherit the outline position of the last numbered row above them, and each
//! row is classified into a [`Level`] by the depth of its path. The result is
//! partitioned into one table per level plus a memo table.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::category::{parse_category, CategoryNode, CHILD_SEGMENT};
use crate::error::{Error, Result};
use crate::frame::{Column, ColumnData, Frame};

/// Substring identifying the category label column; real headers append units.
pub const CATEGORY_COLUMN: &str = "GREENHOUSE GAS SOURCE AND SINK CATEGORIES";

/// Deepest outline supported. CRT codes stay well below this in practice.
pub const MAX_DEPTH: usize = 16;

const NAMED_DEPTH_COLUMNS: [&str; 4] = ["Sector", "Subsector", "Sub_subsector", "Sub_sub_subsector"];

pub const LABEL_COLUMN: &str = "Label";
pub const IS_MEMO_COLUMN: &str = "Is_Memo";
pub const LEVEL_COLUMN: &str = "Level";

/// Classification of one row by the depth of its outline path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Total,
    /// Zero-based depth: 0 is a sector, 1 a subsector and so on.
    Depth(usize),
    Unknown,
}

impl Level {
    pub const SECTOR: Level = Level::Depth(0);
    pub const SUBSECTOR: Level = Level::Depth(1);
    pub const SUB_SUBSECTOR: Level = Level::Depth(2);

    /// Display name stored in the `Level` column.
    pub fn name(self) -> String {
        match self {
            Level::Total => "Total".to_owned(),
            Level::Depth(0) => "Sector".to_owned(),
            Level::Depth(1) => "Subsector".to_owned(),
            Level::Depth(2) => "Sub-subsector".to_owned(),
            Level::Depth(3) => "Sub-sub-subsector".to_owned(),
            Level::Depth(d) => format!("Level-{}", d + 1),
            Level::Unknown => "Unknown".to_owned(),
        }
    }

    /// Output directory name for this level's artifacts.
    pub fn dir_name(self) -> String {
        match self {
            Level::Total => "total".to_owned(),
            Level::Depth(0) => "sectors".to_owned(),
            Level::Depth(1) => "subsectors".to_owned(),
            Level::Depth(2) => "sub_subsectors".to_owned(),
            Level::Depth(3) => "sub_sub_subsectors".to_owned(),
            Level::Depth(d) => format!("level_{}", d + 1),
            Level::Unknown => "unknown".to_owned(),
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Level> {
        match name {
            "total" => Some(Level::Total),
            "sectors" => Some(Level::Depth(0)),
            "subsectors" => Some(Level::Depth(1)),
            "sub_subsectors" => Some(Level::Depth(2)),
            "sub_sub_subsectors" => Some(Level::Depth(3)),
            "unknown" => Some(Level::Unknown),
            other => {
                let n: usize = other.strip_prefix("level_")?.parse().ok()?;
                (5..=MAX_DEPTH).contains(&n).then(|| Level::Depth(n - 1))
            }
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Which output table a row lands in. Memo rows go to their own table
/// whatever their nominal depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKey {
    Level(Level),
    Memo,
}

impl PartitionKey {
    pub fn dir_name(self) -> String {
        match self {
            PartitionKey::Level(level) => level.dir_name(),
            PartitionKey::Memo => "memo_items".to_owned(),
        }
    }

    pub fn from_dir_name(name: &str) -> Option<PartitionKey> {
        if name == "memo_items" {
            return Some(PartitionKey::Memo);
        }
        Level::from_dir_name(name).map(PartitionKey::Level)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Level(level) => level.fmt(f),
            PartitionKey::Memo => f.write_str("Memo"),
        }
    }
}

/// Name of the depth column at zero-based `depth`.
pub fn depth_column_name(depth: usize) -> String {
    NAMED_DEPTH_COLUMNS
        .get(depth)
        .map_or_else(|| format!("Level_{}", depth + 1), |name| (*name).to_owned())
}

/// The depth columns of one sheet, sized to its deepest path.
///
/// At least the eight historical columns (`Sector` .. `Level_8`) are always
/// present so artifacts of different years share a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthColumns {
    names: Vec<String>,
}

impl DepthColumns {
    const MIN_COLUMNS: usize = 8;

    pub fn for_depth(max_depth: usize) -> Result<Self> {
        if max_depth > MAX_DEPTH {
            return Err(Error::DepthExceeded {
                depth: max_depth,
                max: MAX_DEPTH,
            });
        }
        let count = max_depth.max(Self::MIN_COLUMNS);
        Ok(Self {
            names: (0..count).map(depth_column_name).collect(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A parsed row with its level classification. `index` points back into the
/// source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeveledRow {
    pub index: usize,
    pub node: CategoryNode,
    pub level: Level,
}

impl LeveledRow {
    pub fn partition(&self) -> PartitionKey {
        if self.node.is_memo {
            PartitionKey::Memo
        } else {
            PartitionKey::Level(self.level)
        }
    }

    pub fn segment(&self, depth: usize) -> Option<&str> {
        self.node.path.get(depth).map(String::as_str)
    }
}

/// Gives un-numbered rows the path of the nearest numbered row above them.
///
/// This is a left fold over the rows in source order: a numbered, non-memo row
/// replaces the carried context; a prose row that is neither a total nor a
/// memo item gets `context + ["child"]`, or `["1"]` before any context exists.
/// Reordering the input changes the result.
pub fn propagate_context(nodes: Vec<CategoryNode>) -> Vec<CategoryNode> {
    nodes
        .into_iter()
        .scan(Vec::<String>::new(), |context, mut node| {
            if node.is_numbered && !node.is_memo && !node.path.is_empty() {
                context.clone_from(&node.path);
            } else if !node.is_numbered && !node.is_total() && !node.is_memo {
                node.path = if context.is_empty() {
                    vec!["1".to_owned()]
                } else {
                    context
                        .iter()
                        .cloned()
                        .chain(std::iter::once(CHILD_SEGMENT.to_owned()))
                        .collect()
                };
            }
            Some(node)
        })
        .collect()
}

fn classify(node: &CategoryNode) -> Level {
    if node.is_total() {
        Level::Total
    } else if node.path.is_empty() {
        Level::Unknown
    } else {
        Level::Depth(node.path.len() - 1)
    }
}

/// The leveled rows of one sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    depth_columns: DepthColumns,
    rows: Vec<LeveledRow>,
}

impl Hierarchy {
    /// Builds the hierarchy from category labels in source row order.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let parsed = labels.iter().map(|l| parse_category(l.as_ref())).collect();
        let nodes = propagate_context(parsed);

        let max_depth = nodes.iter().map(CategoryNode::depth).max().unwrap_or(0);
        let depth_columns = DepthColumns::for_depth(max_depth)?;

        let rows = nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| LeveledRow {
                index,
                level: classify(&node),
                node,
            })
            .collect();

        Ok(Self {
            depth_columns,
            rows,
        })
    }

    pub fn rows(&self) -> &[LeveledRow] {
        &self.rows
    }

    pub fn depth_columns(&self) -> &DepthColumns {
        &self.depth_columns
    }

    /// True when no row is numbered and no row is a total.
    pub fn is_context_free(&self) -> bool {
        !self
            .rows
            .iter()
            .any(|r| r.node.is_numbered || r.level == Level::Total)
    }

    /// Source row indices grouped by output table, in key order.
    pub fn partition_indices(&self) -> BTreeMap<PartitionKey, Vec<usize>> {
        let mut partitions: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for row in &self.rows {
            partitions.entry(row.partition()).or_default().push(row.index);
        }
        partitions
    }

    /// Depth columns, `Label`, `Is_Memo` and `Level`, one value per row.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .depth_columns
            .names()
            .iter()
            .enumerate()
            .map(|(depth, name)| {
                let values = self
                    .rows
                    .iter()
                    .map(|r| r.segment(depth).map(str::to_owned))
                    .collect();
                Column::new(name.clone(), ColumnData::Utf8(values))
            })
            .collect();

        columns.push(Column::new(
            LABEL_COLUMN,
            ColumnData::Utf8(self.rows.iter().map(|r| Some(r.node.label.clone())).collect()),
        ));
        columns.push(Column::new(
            IS_MEMO_COLUMN,
            ColumnData::Boolean(self.rows.iter().map(|r| Some(r.node.is_memo)).collect()),
        ));
        columns.push(Column::new(
            LEVEL_COLUMN,
            ColumnData::Utf8(self.rows.iter().map(|r| Some(r.level.name())).collect()),
        ));
        columns
    }
}

/// One output table: the rows of a single level, or the memo rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPartition {
    pub key: PartitionKey,
    pub frame: Frame,
}

/// Finds the category column by substring.
pub fn category_column(frame: &Frame) -> Result<&str> {
    frame
        .names()
        .find(|name| name.contains(CATEGORY_COLUMN))
        .ok_or_else(|| Error::CategoryColumnNotFound(CATEGORY_COLUMN.to_owned()))
}

/// Levels a table by its category column and splits it into partitions.
///
/// Every input row ends up in exactly one partition. Partitions come back in
/// key order: Total, Sector, Subsector, ..., Unknown, Memo.
pub fn build_hierarchy(frame: &Frame) -> Result<Vec<LevelPartition>> {
    let category = category_column(frame)?;
    let labels: Vec<String> = frame
        .utf8(category)?
        .iter()
        .map(|l| l.clone().unwrap_or_default())
        .collect();

    let hierarchy = Hierarchy::from_labels(&labels)?;
    if hierarchy.is_context_free() && !labels.is_empty() {
        warn!(rows = labels.len(), "no numbered or total rows; every row is context-less");
    }

    let mut leveled = frame.clone();
    for column in hierarchy.columns() {
        leveled.push_column(column)?;
    }

    let partitions: Vec<LevelPartition> = hierarchy
        .partition_indices()
        .into_iter()
        .map(|(key, indices)| LevelPartition {
            key,
            frame: leveled.take(&indices),
        })
        .collect();

    for partition in &partitions {
        debug!(level = %partition.key, rows = partition.frame.height(), "partition built");
    }
    Ok(partitions)
}
