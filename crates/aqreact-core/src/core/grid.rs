//! Grid-geometry boundary towards the flow model.
//!
//! The flow model owns the grid; this module only queries it. Discretization
//! kinds are dispatched through a static registry, and asking for an
//! unsupported kind is a fatal, reported condition.

use phf::{Map, phf_map};
use thiserror::Error;

/// Structured grid shape, `(nlay, nrow, ncol)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub nlay: usize,
    pub nrow: usize,
    pub ncol: usize,
}

impl GridShape {
    pub fn new(nlay: usize, nrow: usize, ncol: usize) -> Self {
        Self { nlay, nrow, ncol }
    }

    /// Total cell count.
    pub fn ncell(&self) -> usize {
        self.nlay * self.nrow * self.ncol
    }

    /// The `(nrow, ncol)` shape of one layer.
    pub fn layer_shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.nlay, self.nrow, self.ncol)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("grid type '{kind}' is not yet supported")]
    Unsupported { kind: String },
    #[error("this grid type is not supported")]
    NotSupported,
    #[error("grid of type '{kind}' did not provide {what}")]
    MissingGeometry { kind: String, what: &'static str },
}

/// Geometry queries answered by the flow model for its discretization.
pub trait FlowGridInfo {
    /// The discretization type identifier, e.g. `DIS` or `DISV`.
    fn grid_kind(&self) -> &str;

    /// `(nlay, nrow, ncol)` for structured discretizations.
    fn structured_shape(&self) -> Option<GridShape> {
        None
    }

    /// `(nlay, ncpl)` for layered vertex discretizations.
    fn layered_cell_count(&self) -> Option<(usize, usize)> {
        None
    }
}

type CellCountFn = fn(&dyn FlowGridInfo) -> Result<usize, GridError>;

static DISCRETIZATIONS: Map<&'static str, CellCountFn> = phf_map! {
    "DIS" => dis_cells as CellCountFn,
    "DISV" => disv_cells as CellCountFn,
    "DISU" => not_supported as CellCountFn,
    "DISV2D" => not_supported as CellCountFn,
    "DIS3D" => not_supported as CellCountFn,
    "DISV3D" => not_supported as CellCountFn,
    "UNDEFINED" => not_supported as CellCountFn,
};

/// Total number of cells in the flow-model grid.
///
/// Dispatches on the discretization kind; unknown and not-yet-implemented
/// kinds both fail with the offending kind named.
pub fn total_cells(grid: &dyn FlowGridInfo) -> Result<usize, GridError> {
    let kind = grid.grid_kind().to_ascii_uppercase();
    let handler = DISCRETIZATIONS
        .get(kind.as_str())
        .ok_or_else(|| GridError::Unsupported { kind: kind.clone() })?;
    match handler(grid) {
        Err(GridError::NotSupported) => Err(GridError::Unsupported { kind }),
        other => other,
    }
}

fn dis_cells(grid: &dyn FlowGridInfo) -> Result<usize, GridError> {
    grid.structured_shape()
        .map(|shape| shape.ncell())
        .ok_or_else(|| GridError::MissingGeometry {
            kind: grid.grid_kind().to_string(),
            what: "a structured (nlay, nrow, ncol) shape",
        })
}

fn disv_cells(grid: &dyn FlowGridInfo) -> Result<usize, GridError> {
    grid.layered_cell_count()
        .map(|(nlay, ncpl)| nlay * ncpl)
        .ok_or_else(|| GridError::MissingGeometry {
            kind: grid.grid_kind().to_string(),
            what: "a (nlay, ncpl) layered cell count",
        })
}

fn not_supported(_grid: &dyn FlowGridInfo) -> Result<usize, GridError> {
    Err(GridError::NotSupported)
}

/// A plain structured (`DIS`) grid, for callers that know their shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredGrid {
    shape: GridShape,
}

impl StructuredGrid {
    pub fn new(shape: GridShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }
}

impl FlowGridInfo for StructuredGrid {
    fn grid_kind(&self) -> &str {
        "DIS"
    }

    fn structured_shape(&self) -> Option<GridShape> {
        Some(self.shape)
    }
}
