// src/extractors/tables.rs
//! Ruling-line ("lattice") table detection over a scanned page.
//!
//! Edges are snapped and merged, their intersections located, the smallest
//! boxes bounded by edges on all four sides become cells, and cells that
//! share corners are grouped into tables. Each table becomes a grid of
//! optional strings: rows are distinct cell tops, columns distinct cell lefts.

use super::{ItemFailure, Stage};
use crate::document::{Edge, Orientation, PageContent, PdfDocument, TextRun};
use serde::Serialize;

// --- Constants ---
// Coordinates closer than this are treated as the same line.
const SNAP_TOLERANCE: f32 = 3.0;
// Collinear segments with a gap up to this are joined.
const JOIN_TOLERANCE: f32 = 3.0;
// How far an edge may fall short of a crossing edge and still intersect it.
const INTERSECTION_TOLERANCE: f32 = 3.0;
// Shorter segments are noise (underlines of single glyphs, dots).
const MIN_EDGE_LENGTH: f32 = 3.0;
// Coordinates within this are considered equal after snapping.
const EPSILON: f32 = 0.01;

// --- Data Structures ---
/// One detected table: a 2-D grid of raw string cells, `None` where no cell exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub page: u32,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f32,
    y: f32,
}

/// A cell in PDF coordinates (`top > bottom`).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl Cell {
    fn corners(&self) -> [Point; 4] {
        [
            Point { x: self.left, y: self.top },
            Point { x: self.right, y: self.top },
            Point { x: self.left, y: self.bottom },
            Point { x: self.right, y: self.bottom },
        ]
    }

    fn contains(&self, run: &TextRun) -> bool {
        run.x >= self.left - EPSILON
            && run.x < self.right
            && run.y >= self.bottom - EPSILON
            && run.y < self.top
    }
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

// --- Edge preparation ---
/// Replaces every position by the mean of its cluster of near-equal positions.
fn snap_positions(edges: &mut [Edge]) {
    if edges.is_empty() {
        return;
    }
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&a, &b| edges[a].position.total_cmp(&edges[b].position));

    let mut cluster: Vec<usize> = vec![order[0]];
    let flush = |cluster: &mut Vec<usize>, edges: &mut [Edge]| {
        let mean = cluster.iter().map(|&i| edges[i].position).sum::<f32>() / cluster.len() as f32;
        for &i in cluster.iter() {
            edges[i].position = mean;
        }
        cluster.clear();
    };
    for &idx in &order[1..] {
        let last = *cluster.last().unwrap_or(&idx);
        if edges[idx].position - edges[last].position <= SNAP_TOLERANCE {
            cluster.push(idx);
        } else {
            flush(&mut cluster, edges);
            cluster.push(idx);
        }
    }
    flush(&mut cluster, edges);
}

/// Joins overlapping or nearly-touching collinear edges.
fn join_edges(mut edges: Vec<Edge>) -> Vec<Edge> {
    edges.sort_by(|a, b| a.position.total_cmp(&b.position).then(a.start.total_cmp(&b.start)));
    let mut joined: Vec<Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
        match joined.last_mut() {
            Some(last) if close(last.position, edge.position) && edge.start <= last.end + JOIN_TOLERANCE => {
                last.end = last.end.max(edge.end);
            }
            _ => joined.push(edge),
        }
    }
    joined
}

fn prepare(edges: &[Edge], orientation: Orientation) -> Vec<Edge> {
    let mut selected: Vec<Edge> = edges.iter().filter(|e| e.orientation == orientation).copied().collect();
    snap_positions(&mut selected);
    join_edges(selected).into_iter().filter(|e| e.length() >= MIN_EDGE_LENGTH).collect()
}

// --- Grid construction ---
fn intersections(horizontal: &[Edge], vertical: &[Edge]) -> Vec<Point> {
    let mut points = Vec::new();
    for v in vertical {
        for h in horizontal {
            let crosses_x = v.position >= h.start - INTERSECTION_TOLERANCE && v.position <= h.end + INTERSECTION_TOLERANCE;
            let crosses_y = h.position >= v.start - INTERSECTION_TOLERANCE && h.position <= v.end + INTERSECTION_TOLERANCE;
            if crosses_x && crosses_y {
                points.push(Point { x: v.position, y: h.position });
            }
        }
    }
    // Top-to-bottom, then left-to-right.
    points.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
    points.dedup_by(|a, b| close(a.x, b.x) && close(a.y, b.y));
    points
}

fn has_point(points: &[Point], x: f32, y: f32) -> bool {
    points.iter().any(|p| close(p.x, x) && close(p.y, y))
}

/// True when some horizontal edge at `y` spans `x0..x1`.
fn connected_horizontally(horizontal: &[Edge], y: f32, x0: f32, x1: f32) -> bool {
    horizontal.iter().any(|e| {
        close(e.position, y) && e.start - INTERSECTION_TOLERANCE <= x0 && e.end + INTERSECTION_TOLERANCE >= x1
    })
}

/// True when some vertical edge at `x` spans `y0..y1` (`y0 < y1`).
fn connected_vertically(vertical: &[Edge], x: f32, y0: f32, y1: f32) -> bool {
    vertical.iter().any(|e| {
        close(e.position, x) && e.start - INTERSECTION_TOLERANCE <= y0 && e.end + INTERSECTION_TOLERANCE >= y1
    })
}

/// For each intersection taken as a top-left corner, the smallest fully
/// bounded box.
fn find_cells(points: &[Point], horizontal: &[Edge], vertical: &[Edge]) -> Vec<Cell> {
    let mut cells = Vec::new();
    for (i, top_left) in points.iter().enumerate() {
        let rest = &points[i + 1..];
        // Nearest first: points are sorted top-down, then left-right.
        let below = rest.iter().filter(|p| close(p.x, top_left.x) && p.y < top_left.y);
        let right: Vec<&Point> = rest.iter().filter(|p| close(p.y, top_left.y) && p.x > top_left.x).collect();

        'search: for bottom_left in below {
            if !connected_vertically(vertical, top_left.x, bottom_left.y, top_left.y) {
                continue;
            }
            for top_right in &right {
                if !connected_horizontally(horizontal, top_left.y, top_left.x, top_right.x) {
                    continue;
                }
                if has_point(points, top_right.x, bottom_left.y)
                    && connected_horizontally(horizontal, bottom_left.y, bottom_left.x, top_right.x)
                    && connected_vertically(vertical, top_right.x, bottom_left.y, top_right.y)
                {
                    cells.push(Cell { left: top_left.x, right: top_right.x, top: top_left.y, bottom: bottom_left.y });
                    break 'search;
                }
            }
        }
    }
    cells
}

/// Groups cells sharing at least one corner.
fn group_cells(cells: &[Cell]) -> Vec<Vec<Cell>> {
    let mut parent: Vec<usize> = (0..cells.len()).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        parent[i] = root;
        root
    }

    for a in 0..cells.len() {
        for b in (a + 1)..cells.len() {
            let shares_corner = cells[a]
                .corners()
                .iter()
                .any(|p| cells[b].corners().iter().any(|q| close(p.x, q.x) && close(p.y, q.y)));
            if shares_corner {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[rb] = ra;
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<Cell>)> = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        let root = find(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, group)) => group.push(*cell),
            None => groups.push((root, vec![*cell])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

fn unique_sorted(mut values: Vec<f32>, descending: bool) -> Vec<f32> {
    values.sort_by(|a, b| if descending { b.total_cmp(a) } else { a.total_cmp(b) });
    values.dedup_by(|a, b| close(*a, *b));
    values
}

/// Text of the runs inside a cell: top-down lines joined by '\n', runs on a line by ' '.
fn cell_text(cell: &Cell, runs: &[TextRun]) -> String {
    let mut inside: Vec<&TextRun> = runs.iter().filter(|r| cell.contains(r)).collect();
    inside.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<(f32, Vec<&TextRun>)> = Vec::new();
    for run in inside {
        let tolerance = (run.font_size * 0.5).max(1.0);
        match lines.last_mut() {
            Some((y, line)) if (*y - run.y).abs() <= tolerance => line.push(run),
            _ => lines.push((run.y, vec![run])),
        }
    }

    lines
        .into_iter()
        .map(|(_, mut line)| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            line.iter().map(|r| r.text.trim()).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_blank_row(row: &[Option<String>]) -> bool {
    row.iter().all(|cell| cell.as_deref().map_or(true, |text| text.trim().is_empty()))
}

fn build_table(page: u32, cells: &[Cell], runs: &[TextRun]) -> Table {
    let tops = unique_sorted(cells.iter().map(|c| c.top).collect(), true);
    let lefts = unique_sorted(cells.iter().map(|c| c.left).collect(), false);

    let mut rows: Vec<Vec<Option<String>>> = vec![vec![None; lefts.len()]; tops.len()];
    for cell in cells {
        let row = tops.iter().position(|t| close(*t, cell.top));
        let col = lefts.iter().position(|l| close(*l, cell.left));
        if let (Some(row), Some(col)) = (row, col) {
            rows[row][col] = Some(cell_text(cell, runs));
        }
    }

    let before = rows.len();
    rows.retain(|row| !is_blank_row(row));
    if rows.len() != before {
        tracing::trace!("Page {}: dropped {} blank table rows", page, before - rows.len());
    }
    Table { page, rows }
}

/// Detects ruled tables on one scanned page, top-to-bottom then left-to-right.
pub fn detect_tables(page: &PageContent) -> Vec<Table> {
    let horizontal = prepare(&page.edges, Orientation::Horizontal);
    let vertical = prepare(&page.edges, Orientation::Vertical);
    if horizontal.is_empty() || vertical.is_empty() {
        return Vec::new();
    }

    let points = intersections(&horizontal, &vertical);
    let cells = find_cells(&points, &horizontal, &vertical);
    let mut groups = group_cells(&cells);

    let top_left = |group: &Vec<Cell>| {
        let top = group.iter().map(|c| c.top).fold(f32::MIN, f32::max);
        let left = group.iter().map(|c| c.left).fold(f32::MAX, f32::min);
        (top, left)
    };
    groups.sort_by(|a, b| {
        let (ta, la) = top_left(a);
        let (tb, lb) = top_left(b);
        tb.total_cmp(&ta).then(la.total_cmp(&lb))
    });

    let tables: Vec<Table> = groups
        .iter()
        .map(|group| build_table(page.page_number, group, &page.runs))
        .filter(|table| !table.rows.is_empty())
        .collect();
    tracing::debug!(
        "Page {}: {} edges -> {} cells -> {} tables",
        page.page_number,
        page.edges.len(),
        cells.len(),
        tables.len()
    );
    tables
}

#[derive(Debug, Default)]
pub struct TableStageOutput {
    pub tables: Vec<Table>,
    pub failures: Vec<ItemFailure>,
}

/// Runs table detection over every page in order. A page whose content cannot
/// be scanned is recorded as a failure and contributes no tables.
pub fn extract_tables(doc: &PdfDocument) -> TableStageOutput {
    let mut output = TableStageOutput::default();
    for page_number in doc.page_numbers() {
        match doc.page_content(page_number) {
            Ok(content) => output.tables.extend(detect_tables(&content)),
            Err(e) => {
                tracing::warn!("Skipping table detection on page {}: {}", page_number, e);
                output.failures.push(ItemFailure::new(Stage::Tables, &format!("page_{}", page_number), e.to_string()));
            }
        }
    }
    tracing::info!("Detected {} tables across {} pages", output.tables.len(), doc.page_count());
    output
}
