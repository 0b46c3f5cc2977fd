//! The photo puzzle generator cuts a rectangular photo into a grid of interlocking jigsaw
//! pieces and renders a matching printable cut guide. It provides one orchestrating type and a
//! handful of free functions:
//!
//! - [`PuzzleCutter`] runs a whole cut: grid planning, edge pattern, per-piece masks and
//!     cutouts, plus the guide image. This is the type you normally want to use
//! - [`plan_grid`] computes a row/column count that keeps pieces approximately square
//! - [`generate_edge_pattern`] assigns a tab or a hole to every internal grid boundary
//! - [`tab_profile`] samples the silhouette of a single tab or hole along one edge
//! - [`build_piece_mask`], [`composite_piece`] and [`render_guide`] are the lower level
//!     building blocks for callers that drive the cut themselves
//!
//! All outputs are newly allocated RGBA buffers; the engine performs no file or network I/O.

use anyhow::{anyhow, Result};
use image::{
    imageops::FilterType, DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage,
};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::ParallelIterator;
use std::f32::consts::PI;

pub use image;
pub use imageproc;

/// Fallback when the caller supplies no usable piece count.
const DEFAULT_PIECE_COUNT: usize = 20;
/// Photos with a longer side above this are downsampled before cutting.
const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// How far a tab protrudes beyond the cell boundary, as a fraction of the edge length.
const TAB_PROTRUSION: f32 = 0.2;
/// Width of the rectangular tab neck, as a fraction of the edge length.
const RECT_NECK_FRACTION: f32 = 0.3;
/// Sideways splay of the rectangular tab head beyond the neck.
const RECT_HEAD_FLARE: f32 = 0.03;
/// Widest extent of the curved tab head, as a fraction of the edge length.
const CURVED_HEAD_FRACTION: f32 = 0.35;
/// Number of arc samples for the curved tab silhouette.
const CURVED_SAMPLES: usize = 24;

const RECT_PADDING_FACTOR: f32 = 0.3;
const CURVED_PADDING_FACTOR: f32 = 0.4;

const DARK_STROKE_COLOR: Rgba<u8> = Rgba([16, 16, 16, 255]);
const LIGHT_STROKE_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FRAME_FILL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Shape of the tab silhouette used on every non-flat edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProfileKind {
    /// A trapezoid bump. Cheap to cut by hand.
    Rectangular,
    /// A bulbous head on a smooth arc, close to a classic jigsaw tab.
    #[default]
    Curved,
}

impl ProfileKind {
    fn padding_factor(self) -> f32 {
        match self {
            ProfileKind::Rectangular => RECT_PADDING_FACTOR,
            ProfileKind::Curved => CURVED_PADDING_FACTOR,
        }
    }
}

/// Classification of one side of a puzzle piece.
///
/// Sides on the photo perimeter are [`Flat`](EdgeKind::Flat). Every internal boundary is a
/// [`Tab`](EdgeKind::Tab) seen from one piece and a [`Hole`](EdgeKind::Hole) seen from its
/// neighbor, so adjacent pieces always mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Flat,
    Tab,
    Hole,
}

impl EdgeKind {
    /// Swaps tab and hole. The same boundary read from the far side.
    pub fn inverted(self) -> Self {
        match self {
            EdgeKind::Flat => EdgeKind::Flat,
            EdgeKind::Tab => EdgeKind::Hole,
            EdgeKind::Hole => EdgeKind::Tab,
        }
    }

    fn is_tab(self) -> bool {
        matches!(self, EdgeKind::Tab)
    }
}

/// Number of piece rows and columns for one cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn piece_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// The four side classifications of one piece, in clockwise order from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceEdges {
    pub top: EdgeKind,
    pub right: EdgeKind,
    pub bottom: EdgeKind,
    pub left: EdgeKind,
}

/// Tab/hole choices for every internal boundary of a grid.
///
/// Entries are stored row-major in flat vectors: `vertical` holds one entry per internal
/// column boundary (`rows * (cols - 1)` of them), `horizontal` one per internal row boundary
/// (`(rows - 1) * cols`). An entry records the classification as seen from the piece above or
/// to the left of the boundary; the far side reads the inverted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePattern {
    rows: usize,
    cols: usize,
    vertical: Vec<EdgeKind>,
    horizontal: Vec<EdgeKind>,
}

impl EdgePattern {
    /// Entry for the boundary between piece `(row, col)` and piece `(row, col + 1)`, i.e. the
    /// right edge of `(row, col)`.
    pub fn vertical_at(&self, row: usize, col: usize) -> EdgeKind {
        self.vertical[row * (self.cols - 1) + col]
    }

    /// Entry for the boundary between piece `(row, col)` and piece `(row + 1, col)`, i.e. the
    /// bottom edge of `(row, col)`.
    pub fn horizontal_at(&self, row: usize, col: usize) -> EdgeKind {
        self.horizontal[row * self.cols + col]
    }

    /// Derives the four side classifications of piece `(row, col)`.
    pub fn piece_edges(&self, row: usize, col: usize) -> PieceEdges {
        let top = if row == 0 {
            EdgeKind::Flat
        } else {
            self.horizontal_at(row - 1, col).inverted()
        };
        let right = if col == self.cols - 1 {
            EdgeKind::Flat
        } else {
            self.vertical_at(row, col)
        };
        let bottom = if row == self.rows - 1 {
            EdgeKind::Flat
        } else {
            self.horizontal_at(row, col)
        };
        let left = if col == 0 {
            EdgeKind::Flat
        } else {
            self.vertical_at(row, col - 1).inverted()
        };
        PieceEdges {
            top,
            right,
            bottom,
            left,
        }
    }
}

/// Computes a grid of approximately square pieces for an image of the given inner dimensions.
///
/// `rows = ⌊√(N / (W/H))⌋` and `cols = ⌊N / rows⌋`, both clamped to at least 1. The product
/// only approximates the requested count; extreme aspect ratios deviate further. Callers that
/// reserve a print margin pass the inset dimensions.
pub fn plan_grid(width: f32, height: f32, piece_count: usize) -> GridSpec {
    let aspect_ratio = width / height;
    let rows = (piece_count as f32 / aspect_ratio).sqrt() as usize;
    let cols = (piece_count as f32 / rows.max(1) as f32) as usize;
    GridSpec {
        rows: rows.max(1),
        cols: cols.max(1),
    }
}

/// Draws a uniform tab-or-hole choice for every internal boundary of a `rows x cols` grid.
///
/// The random source is injected so a seeded generator reproduces the same pattern.
pub fn generate_edge_pattern<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> EdgePattern {
    let mut choose = |_| {
        if rng.gen_bool(0.5) {
            EdgeKind::Tab
        } else {
            EdgeKind::Hole
        }
    };
    let vertical = (0..rows * cols.saturating_sub(1)).map(&mut choose).collect();
    let horizontal = (0..rows.saturating_sub(1) * cols).map(&mut choose).collect();
    EdgePattern {
        rows,
        cols,
        vertical,
        horizontal,
    }
}

/// Samples the silhouette of one tab or hole along an edge of the given length.
///
/// Points are in local coordinates: the edge runs from `(0, 0)` to `(length, 0)` and a
/// positive offset protrudes outward for a tab. The hole variant is the exact per-sample sign
/// negation. The first and last points are always exactly the edge endpoints, so concatenating
/// profiles with straight corner segments yields a closed, non-self-intersecting polygon.
pub fn tab_profile(length: f32, is_tab: bool, kind: ProfileKind) -> Vec<(f32, f32)> {
    let sign = if is_tab { 1.0 } else { -1.0 };
    match kind {
        ProfileKind::Rectangular => rectangular_profile(length, sign),
        ProfileKind::Curved => curved_profile(length, sign),
    }
}

/// A trapezoid bump: neck centered on the edge, head splayed slightly wider so pieces hold.
fn rectangular_profile(length: f32, sign: f32) -> Vec<(f32, f32)> {
    let neck_start = (0.5 - RECT_NECK_FRACTION / 2.0) * length;
    let neck_end = (0.5 + RECT_NECK_FRACTION / 2.0) * length;
    let flare = RECT_HEAD_FLARE * length;
    let head = TAB_PROTRUSION * length * sign;
    vec![
        (0.0, 0.0),
        (neck_start, 0.0),
        (neck_start - flare, head),
        (neck_end + flare, head),
        (neck_end, 0.0),
        (length, 0.0),
    ]
}

/// A circular head arc: the circle is lifted so its top sits at the full protrusion height and
/// its widest point clears the baseline, which gives the bulbous jigsaw look.
fn curved_profile(length: f32, sign: f32) -> Vec<(f32, f32)> {
    let radius = CURVED_HEAD_FRACTION / 2.0 * length;
    let center_x = 0.5 * length;
    let center_y = TAB_PROTRUSION * length - radius;
    // Angle below the horizontal at which the arc meets the baseline.
    let base_angle = (center_y / radius).asin();
    let start = PI + base_angle;
    let sweep = PI + 2.0 * base_angle;
    let mut points = Vec::with_capacity(CURVED_SAMPLES + 3);
    points.push((0.0, 0.0));
    for i in 0..=CURVED_SAMPLES {
        let theta = start - sweep * (i as f32 / CURVED_SAMPLES as f32);
        let x = center_x + radius * theta.cos();
        let offset = (center_y + radius * theta.sin()).max(0.0);
        points.push((x, offset * sign));
    }
    points.push((length, 0.0));
    points
}

/// Builds the alpha mask of one piece from its cell size and four side classifications.
///
/// The mask canvas is the cell enlarged by a uniform padding sized to contain the largest tab
/// protrusion of the chosen profile. Returns the rasterized mask (255 inside the cut polygon,
/// 0 outside) and the padding in pixels. Masks are rebuilt per piece; the side classifications
/// differ cell by cell so there is nothing to cache.
pub fn build_piece_mask(
    cell_width: f32,
    cell_height: f32,
    edges: PieceEdges,
    kind: ProfileKind,
) -> (GrayImage, u32) {
    let padding = (kind.padding_factor() * cell_width.max(cell_height)).ceil() as u32;
    let mask_width = cell_width.round() as u32 + 2 * padding;
    let mask_height = cell_height.round() as u32 + 2 * padding;
    let p = padding as f32;
    let (cw, ch) = (cell_width, cell_height);

    // Walk the four sides clockwise from the inner top-left corner. Each side maps the local
    // profile frame (x along the walk direction, positive offset outward) into mask
    // coordinates.
    let mut contour: Vec<Point<i32>> = Vec::new();
    append_side(&mut contour, (p, p), edges.top, cw, kind, |x, y| {
        (p + x, p - y)
    });
    append_side(&mut contour, (p + cw, p), edges.right, ch, kind, |x, y| {
        (p + cw + y, p + x)
    });
    append_side(
        &mut contour,
        (p + cw, p + ch),
        edges.bottom,
        cw,
        kind,
        |x, y| (p + cw - x, p + ch + y),
    );
    append_side(&mut contour, (p, p + ch), edges.left, ch, kind, |x, y| {
        (p - y, p + ch - x)
    });
    // The polygon closes implicitly; a trailing point equal to the first would trip the
    // rasterizer.
    while contour.len() > 1 && contour.last() == contour.first() {
        contour.pop();
    }

    let mut mask = GrayImage::new(mask_width, mask_height);
    draw_polygon_mut(&mut mask, &contour, Luma([255u8]));
    (mask, padding)
}

fn append_side<F>(
    contour: &mut Vec<Point<i32>>,
    corner: (f32, f32),
    edge: EdgeKind,
    length: f32,
    kind: ProfileKind,
    to_canvas: F,
) where
    F: Fn(f32, f32) -> (f32, f32),
{
    push_point(contour, corner);
    if edge == EdgeKind::Flat {
        return;
    }
    let profile = tab_profile(length, edge.is_tab(), kind);
    // The profile endpoints coincide with the side corners already on the contour.
    for &(x, y) in &profile[1..profile.len() - 1] {
        push_point(contour, to_canvas(x, y));
    }
}

fn push_point(contour: &mut Vec<Point<i32>>, point: (f32, f32)) {
    let point = Point::new(point.0.round() as i32, point.1.round() as i32);
    if contour.last() != Some(&point) {
        contour.push(point);
    }
}

/// Cuts one piece image out of the source photo.
///
/// The crop window is the cell rectangle at `cell_origin` grown by the mask padding on every
/// side. Where the window leaves the photo the piece stays fully transparent; only the
/// in-bounds intersection is copied, at its matching offset. The mask then becomes the alpha
/// channel, discarding all color outside the cut polygon.
pub fn composite_piece(
    source: &RgbaImage,
    cell_origin: (f32, f32),
    mask: &GrayImage,
    padding: u32,
) -> RgbaImage {
    let (mask_width, mask_height) = mask.dimensions();
    let (source_width, source_height) = source.dimensions();
    let crop_x = cell_origin.0.round() as i64 - padding as i64;
    let crop_y = cell_origin.1.round() as i64 - padding as i64;

    let mut piece = RgbaImage::new(mask_width, mask_height);
    for y in 0..mask_height {
        let source_y = crop_y + y as i64;
        if source_y < 0 || source_y >= source_height as i64 {
            continue;
        }
        for x in 0..mask_width {
            let source_x = crop_x + x as i64;
            if source_x < 0 || source_x >= source_width as i64 {
                continue;
            }
            piece.put_pixel(x, y, *source.get_pixel(source_x as u32, source_y as u32));
        }
    }

    piece.par_enumerate_pixels_mut().for_each(|(x, y, pixel)| {
        let alpha = mask.get_pixel(x, y)[0];
        if alpha == 0 {
            *pixel = Rgba([0, 0, 0, 0]);
        } else {
            pixel.0[3] = pixel.0[3].min(alpha);
        }
    });
    piece
}

/// Renders the printable cut guide: the photo with every cut curve drawn on top.
///
/// Each internal boundary is stroked with the same profile its piece masks use, so the printed
/// lines match the actual cuts. Lines are drawn as a dark stroke with a thin light core so
/// they stay visible on any photo. With a margin fraction configured, the border band is
/// painted first, the cut curves next and the sharp frame outline last.
pub fn render_guide(
    source: &RgbaImage,
    grid: GridSpec,
    pattern: &EdgePattern,
    kind: ProfileKind,
    margin: Option<f32>,
) -> RgbaImage {
    let mut guide = source.clone();
    let (width, height) = guide.dimensions();
    let margin_px = margin
        .map(|fraction| round(fraction * width.min(height) as f32))
        .unwrap_or(0.0);
    let inner_width = width as f32 - 2.0 * margin_px;
    let inner_height = height as f32 - 2.0 * margin_px;
    let (starts_x, cell_width) = divide_axis(inner_width, grid.cols);
    let (starts_y, cell_height) = divide_axis(inner_height, grid.rows);

    let framed = margin_px >= 1.0;
    if framed {
        let m = margin_px as u32;
        draw_filled_rect_mut(
            &mut guide,
            Rect::at(0, 0).of_size(width, m),
            FRAME_FILL_COLOR,
        );
        draw_filled_rect_mut(
            &mut guide,
            Rect::at(0, (height - m) as i32).of_size(width, m),
            FRAME_FILL_COLOR,
        );
        draw_filled_rect_mut(
            &mut guide,
            Rect::at(0, 0).of_size(m, height),
            FRAME_FILL_COLOR,
        );
        draw_filled_rect_mut(
            &mut guide,
            Rect::at((width - m) as i32, 0).of_size(m, height),
            FRAME_FILL_COLOR,
        );
    }

    for row in 0..grid.rows {
        for col in 0..grid.cols.saturating_sub(1) {
            let edge = pattern.vertical_at(row, col);
            let boundary_x = margin_px + starts_x[col + 1];
            let boundary_y = margin_px + starts_y[row];
            let curve: Vec<(f32, f32)> = tab_profile(cell_height, edge.is_tab(), kind)
                .into_iter()
                .map(|(x, y)| (boundary_x + y, boundary_y + x))
                .collect();
            draw_cut_curve(&mut guide, &curve);
        }
    }
    for row in 0..grid.rows.saturating_sub(1) {
        for col in 0..grid.cols {
            let edge = pattern.horizontal_at(row, col);
            let boundary_x = margin_px + starts_x[col];
            let boundary_y = margin_px + starts_y[row + 1];
            let curve: Vec<(f32, f32)> = tab_profile(cell_width, edge.is_tab(), kind)
                .into_iter()
                .map(|(x, y)| (boundary_x + x, boundary_y + y))
                .collect();
            draw_cut_curve(&mut guide, &curve);
        }
    }

    if framed {
        let m = margin_px as u32;
        draw_hollow_rect_mut(
            &mut guide,
            Rect::at(m as i32, m as i32).of_size(width - 2 * m, height - 2 * m),
            DARK_STROKE_COLOR,
        );
    }
    guide
}

fn draw_cut_curve(canvas: &mut RgbaImage, points: &[(f32, f32)]) {
    for offset in [(0.0, 0.0), (1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)] {
        draw_polyline(canvas, points, offset, DARK_STROKE_COLOR);
    }
    draw_polyline(canvas, points, (0.0, 0.0), LIGHT_STROKE_COLOR);
}

fn draw_polyline(
    canvas: &mut RgbaImage,
    points: &[(f32, f32)],
    offset: (f32, f32),
    color: Rgba<u8>,
) {
    for pair in points.windows(2) {
        draw_line_segment_mut(
            canvas,
            (pair[0].0 + offset.0, pair[0].1 + offset.1),
            (pair[1].0 + offset.0, pair[1].1 + offset.1),
            color,
        );
    }
}

/// Divides the axis into `cells` cells of equal length. Returns the starting offset of each
/// cell and the cell length.
fn divide_axis(length: f32, cells: usize) -> (Vec<f32>, f32) {
    let cell_length = round(length / cells as f32);
    (
        (0..cells)
            .map(|s| round(s as f32 * cell_length))
            .collect::<Vec<f32>>(),
        cell_length,
    )
}

/// Rounds a given rational number to two decimal places.
pub fn round(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// Scales the image down so that its longer side does not exceed `max_dimension`, keeping the
/// aspect ratio. Images already within the bound are returned unchanged.
fn scale_image(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension {
        return image.clone();
    }
    let scale = max_dimension as f32 / longest as f32;
    image.resize(
        (width as f32 * scale) as u32,
        (height as f32 * scale) as u32,
        FilterType::Lanczos3,
    )
}

/// A photo puzzle cutter
///
/// Cuts a photo into a grid of interlocking puzzle piece cutouts plus a printable cut guide.
/// The number of pieces is approximate: the grid is chosen to keep pieces roughly square, so
/// `rows * cols` may differ from the requested count.
///
/// `profile` selects the tab silhouette, `margin` an optional print margin as a fraction of
/// the shorter image side, `max_dimension` the downsampling bound for large photos and `seed`
/// a fixed randomness source. Same seed, same photo and same piece count reproduce the same
/// pieces.
#[derive(Debug)]
pub struct PuzzleCutter {
    /// The original photo from which the puzzle pieces will be cut.
    origin_image: DynamicImage,
    /// The requested number of pieces.
    piece_count: usize,
    /// The tab silhouette used on every internal boundary.
    profile: ProfileKind,
    /// Optional print margin as a fraction of the shorter image side.
    margin: Option<f32>,
    /// Downsampling bound for the longer image side, `None` to cut at full resolution.
    max_dimension: Option<u32>,
    /// Optional seed value for the edge pattern randomness.
    seed: Option<u64>,
}

impl PuzzleCutter {
    pub fn new(origin_image: DynamicImage, piece_count: usize) -> Self {
        let piece_count = if piece_count == 0 {
            debug!("invalid piece count, falling back to {DEFAULT_PIECE_COUNT}");
            DEFAULT_PIECE_COUNT
        } else {
            piece_count
        };
        PuzzleCutter {
            origin_image,
            piece_count,
            profile: ProfileKind::default(),
            margin: None,
            max_dimension: Some(DEFAULT_MAX_DIMENSION),
            seed: None,
        }
    }

    /// Creates a new `PuzzleCutter` from an image file at the given `image_path`.
    pub fn from_path(image_path: &str, piece_count: usize) -> Result<Self> {
        let origin_image = image::open(image_path)?;
        info!(
            "loaded image from {} with dimensions {}x{}",
            image_path,
            origin_image.width(),
            origin_image.height()
        );
        Ok(PuzzleCutter::new(origin_image, piece_count))
    }

    /// Creates a new `PuzzleCutter` from a raw RGBA8 buffer.
    pub fn from_rgba8(
        width: u32,
        height: u32,
        image_bytes: &[u8],
        piece_count: usize,
    ) -> Result<Self> {
        let origin_image = DynamicImage::ImageRgba8(
            RgbaImage::from_raw(width, height, image_bytes.to_vec()).ok_or_else(|| {
                anyhow!(
                    "invalid image: {} bytes cannot back a {}x{} RGBA buffer",
                    image_bytes.len(),
                    width,
                    height
                )
            })?,
        );
        Ok(PuzzleCutter::new(origin_image, piece_count))
    }

    pub fn profile(mut self, profile: ProfileKind) -> Self {
        self.profile = profile;
        self
    }

    /// Reserves a print margin. `fraction` is relative to the shorter image side.
    pub fn margin(mut self, fraction: f32) -> Self {
        assert!((0.0..=0.25).contains(&fraction));
        self.margin = Some(fraction);
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = Some(max_dimension);
        self
    }

    /// Cuts at full resolution, however large the photo is.
    pub fn without_resize(mut self) -> Self {
        self.max_dimension = None;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn origin_image(&self) -> &DynamicImage {
        &self.origin_image
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Runs one whole cut and returns every piece cutout plus the guide image.
    pub fn cut(&self) -> Result<PuzzlePack> {
        let processed = match self.max_dimension {
            Some(max_dimension) => scale_image(&self.origin_image, max_dimension),
            None => self.origin_image.clone(),
        };
        let source = processed.to_rgba8();
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("invalid image: {width}x{height} has no pixels"));
        }
        info!(
            "cutting {}x{} photo into about {} pieces",
            width, height, self.piece_count
        );

        let margin_px = self
            .margin
            .map(|fraction| round(fraction * width.min(height) as f32))
            .unwrap_or(0.0);
        let inner_width = width as f32 - 2.0 * margin_px;
        let inner_height = height as f32 - 2.0 * margin_px;
        let grid = plan_grid(inner_width, inner_height, self.piece_count);
        let (starts_x, cell_width) = divide_axis(inner_width, grid.cols);
        let (starts_y, cell_height) = divide_axis(inner_height, grid.rows);
        debug!(
            "grid {}x{}, cell {}x{}",
            grid.rows, grid.cols, cell_width, cell_height
        );

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pattern = generate_edge_pattern(grid.rows, grid.cols, &mut rng);

        let mut pieces = Vec::with_capacity(grid.piece_count());
        for row in 0..grid.rows {
            for col in 0..grid.cols {
                debug!("cutting piece ({row}, {col})");
                let edges = pattern.piece_edges(row, col);
                let (mask, padding) =
                    build_piece_mask(cell_width, cell_height, edges, self.profile);
                let cell_origin = (margin_px + starts_x[col], margin_px + starts_y[row]);
                let image = composite_piece(&source, cell_origin, &mask, padding);
                pieces.push(PuzzlePiece { row, col, image });
            }
        }

        let guide = render_guide(&source, grid, &pattern, self.profile, self.margin);

        Ok(PuzzlePack {
            pieces,
            guide,
            grid,
            piece_dimensions: (cell_width, cell_height),
            processed_image: source,
        })
    }
}

/// One cut-out puzzle piece.
#[derive(Debug, Clone)]
pub struct PuzzlePiece {
    /// Grid row of the piece.
    pub row: usize,
    /// Grid column of the piece.
    pub col: usize,
    /// The piece cutout: cell plus padding, transparent outside the cut polygon.
    pub image: RgbaImage,
}

/// Everything one cut produces.
#[derive(Debug, Clone)]
pub struct PuzzlePack {
    /// The piece cutouts in row-major order.
    pub pieces: Vec<PuzzlePiece>,
    /// The printable cut guide.
    pub guide: RgbaImage,
    /// The planned grid.
    pub grid: GridSpec,
    /// The cell dimensions (width, height) in pixels, before padding.
    pub piece_dimensions: (f32, f32),
    /// The photo the pieces were cut from, after any downsampling.
    pub processed_image: RgbaImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    fn flat_edges() -> PieceEdges {
        PieceEdges {
            top: EdgeKind::Flat,
            right: EdgeKind::Flat,
            bottom: EdgeKind::Flat,
            left: EdgeKind::Flat,
        }
    }

    #[test]
    fn test_plan_grid() {
        // Approximate-count behaviour: 800x600 at 20 pieces lands on 3x6.
        let grid = plan_grid(800.0, 600.0, 20);
        assert_eq!((grid.rows, grid.cols), (3, 6));

        let grid = plan_grid(600.0, 600.0, 9);
        assert_eq!((grid.rows, grid.cols), (3, 3));

        // Degenerate row count clamps to 1.
        let grid = plan_grid(800.0, 600.0, 1);
        assert_eq!((grid.rows, grid.cols), (1, 1));

        for n in 1..=100 {
            let grid = plan_grid(1234.0, 321.0, n);
            assert!(grid.rows >= 1 && grid.cols >= 1);
        }
    }

    #[test]
    fn test_divide_axis() {
        let res = divide_axis(1000.0, 4);
        assert_eq!(res.0.len(), 4);
        assert!(res.1 > 249.0 && res.1 < 251.0);
    }

    #[test]
    fn test_edge_pattern_boundaries_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let pattern = generate_edge_pattern(4, 5, &mut rng);
        for row in 0..4 {
            for col in 0..5 {
                let edges = pattern.piece_edges(row, col);
                assert_eq!(edges.top == EdgeKind::Flat, row == 0);
                assert_eq!(edges.bottom == EdgeKind::Flat, row == 3);
                assert_eq!(edges.left == EdgeKind::Flat, col == 0);
                assert_eq!(edges.right == EdgeKind::Flat, col == 4);
                if col < 4 {
                    let neighbor = pattern.piece_edges(row, col + 1);
                    assert_eq!(edges.right, neighbor.left.inverted());
                    assert_ne!(edges.right, neighbor.left);
                }
                if row < 3 {
                    let neighbor = pattern.piece_edges(row + 1, col);
                    assert_eq!(edges.bottom, neighbor.top.inverted());
                    assert_ne!(edges.bottom, neighbor.top);
                }
            }
        }
    }

    #[test]
    fn test_edge_pattern_seeded_reproducible() {
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        assert_eq!(
            generate_edge_pattern(6, 4, &mut rng_a),
            generate_edge_pattern(6, 4, &mut rng_b)
        );
    }

    #[test]
    fn test_tab_profile_hole_is_sign_negated_tab() {
        for kind in [ProfileKind::Rectangular, ProfileKind::Curved] {
            let tab = tab_profile(100.0, true, kind);
            let hole = tab_profile(100.0, false, kind);
            assert_eq!(tab.len(), hole.len());
            for (t, h) in tab.iter().zip(hole.iter()) {
                assert_eq!(t.0, h.0);
                assert_eq!(t.1, -h.1);
            }
        }
    }

    #[test]
    fn test_tab_profile_shape() {
        let rect = tab_profile(100.0, true, ProfileKind::Rectangular);
        assert_eq!(rect.len(), 6);
        let curved = tab_profile(100.0, true, ProfileKind::Curved);
        assert!(curved.len() >= 16);

        for profile in [&rect, &curved] {
            assert_eq!(*profile.first().unwrap(), (0.0, 0.0));
            assert_eq!(*profile.last().unwrap(), (100.0, 0.0));
            let peak = profile.iter().map(|p| p.1).fold(0.0f32, f32::max);
            assert!(peak > 19.0 && peak < 21.0);
            // Symmetric about the edge midpoint, which keeps guide strokes and mask walks
            // congruent however the side is traversed.
            let n = profile.len();
            for i in 0..n {
                assert!((profile[i].0 + profile[n - 1 - i].0 - 100.0).abs() < 1e-2);
                assert!((profile[i].1 - profile[n - 1 - i].1).abs() < 1e-2);
            }
        }

        // Pure function of its inputs.
        assert_eq!(
            tab_profile(37.5, true, ProfileKind::Curved),
            tab_profile(37.5, true, ProfileKind::Curved)
        );
    }

    #[test]
    fn test_flat_mask_covers_exactly_the_cell() {
        let (mask, padding) = build_piece_mask(40.0, 30.0, flat_edges(), ProfileKind::Rectangular);
        assert_eq!(padding, 12);
        assert_eq!(mask.dimensions(), (64, 54));
        // Inside the cell.
        assert_eq!(mask.get_pixel(32, 27)[0], 255);
        assert_eq!(mask.get_pixel(14, 14)[0], 255);
        assert_eq!(mask.get_pixel(50, 40)[0], 255);
        // Padding ring stays clear.
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
        assert_eq!(mask.get_pixel(60, 50)[0], 0);
        assert_eq!(mask.get_pixel(32, 5)[0], 0);
    }

    #[test]
    fn test_corner_piece_mask_follows_pattern() {
        let mut rng = StdRng::seed_from_u64(21);
        let pattern = generate_edge_pattern(3, 3, &mut rng);
        let edges = pattern.piece_edges(0, 0);
        assert_eq!(edges.top, EdgeKind::Flat);
        assert_eq!(edges.left, EdgeKind::Flat);
        assert_eq!(edges.right, pattern.vertical_at(0, 0));
        assert_eq!(edges.bottom, pattern.horizontal_at(0, 0));

        let (mask, padding) = build_piece_mask(30.0, 30.0, edges, ProfileKind::Curved);
        let p = padding as f32;
        // Probe just outside and just inside the right boundary at mid-edge: a tab bulges
        // outward there, a hole eats into the cell.
        let outward = ((p + 30.0 + 3.0) as u32, (p + 15.0) as u32);
        let inward = ((p + 30.0 - 3.0) as u32, (p + 15.0) as u32);
        match edges.right {
            EdgeKind::Tab => assert_eq!(mask.get_pixel(outward.0, outward.1)[0], 255),
            EdgeKind::Hole => assert_eq!(mask.get_pixel(inward.0, inward.1)[0], 0),
            EdgeKind::Flat => unreachable!(),
        }
        let outward = ((p + 15.0) as u32, (p + 30.0 + 3.0) as u32);
        let inward = ((p + 15.0) as u32, (p + 30.0 - 3.0) as u32);
        match edges.bottom {
            EdgeKind::Tab => assert_eq!(mask.get_pixel(outward.0, outward.1)[0], 255),
            EdgeKind::Hole => assert_eq!(mask.get_pixel(inward.0, inward.1)[0], 0),
            EdgeKind::Flat => unreachable!(),
        }
    }

    #[test]
    fn test_composite_piece_inside_bounds() {
        let red = Rgba([255, 0, 0, 255]);
        let source = solid_image(20, 20, red);
        let (mask, padding) = build_piece_mask(10.0, 10.0, flat_edges(), ProfileKind::Rectangular);
        let piece = composite_piece(&source, (5.0, 5.0), &mask, padding);
        assert_eq!(piece.dimensions(), mask.dimensions());
        // Cell interior keeps the photo at full opacity, padding is exactly transparent.
        assert_eq!(*piece.get_pixel(8, 8), red);
        assert_eq!(*piece.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
        for (x, y, pixel) in piece.enumerate_pixels() {
            match mask.get_pixel(x, y)[0] {
                0 => assert_eq!(pixel[3], 0),
                alpha => assert!(pixel[3] <= alpha),
            }
        }
    }

    #[test]
    fn test_composite_piece_clips_at_image_border() {
        let red = Rgba([255, 0, 0, 255]);
        let source = solid_image(20, 20, red);
        let mask = GrayImage::from_pixel(16, 16, Luma([255]));

        // Top-left corner cell: the padded window starts at (-3, -3).
        let piece = composite_piece(&source, (0.0, 0.0), &mask, 3);
        assert_eq!(*piece.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*piece.get_pixel(3, 3), red);

        // Bottom-right corner cell: the window runs past the far image edge.
        let piece = composite_piece(&source, (10.0, 10.0), &mask, 3);
        assert_eq!(*piece.get_pixel(5, 5), red);
        assert_eq!(*piece.get_pixel(15, 15), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_render_guide_draws_cut_lines() {
        let gray = Rgba([40, 40, 40, 255]);
        let source = solid_image(90, 90, gray);
        let grid = GridSpec { rows: 3, cols: 3 };
        let mut rng = StdRng::seed_from_u64(3);
        let pattern = generate_edge_pattern(3, 3, &mut rng);

        let guide = render_guide(&source, grid, &pattern, ProfileKind::Rectangular, None);
        assert_eq!(guide.dimensions(), (90, 90));
        // The straight run of the first vertical boundary carries the light core stroke.
        assert_eq!(*guide.get_pixel(30, 5), LIGHT_STROKE_COLOR);
        // Far corners stay untouched without a margin.
        assert_eq!(*guide.get_pixel(0, 0), gray);
        assert_eq!(*guide.get_pixel(89, 89), gray);
    }

    #[test]
    fn test_render_guide_with_margin_frame() {
        let gray = Rgba([40, 40, 40, 255]);
        let source = solid_image(90, 90, gray);
        let grid = GridSpec { rows: 2, cols: 2 };
        let mut rng = StdRng::seed_from_u64(3);
        let pattern = generate_edge_pattern(2, 2, &mut rng);

        let guide = render_guide(&source, grid, &pattern, ProfileKind::Curved, Some(0.1));
        // Border band painted over, frame outline on the active-area boundary.
        assert_eq!(*guide.get_pixel(2, 45), FRAME_FILL_COLOR);
        assert_eq!(*guide.get_pixel(9, 30), DARK_STROKE_COLOR);
    }

    #[test]
    fn test_cut_seeded_end_to_end() {
        let source = DynamicImage::ImageRgba8(solid_image(120, 90, Rgba([0, 128, 255, 255])));
        let cutter = PuzzleCutter::new(source.clone(), 6)
            .profile(ProfileKind::Rectangular)
            .seed(42);
        let pack = cutter.cut().expect("cut failed");

        assert_eq!((pack.grid.rows, pack.grid.cols), (2, 3));
        assert_eq!(pack.pieces.len(), 6);
        assert_eq!(pack.guide.dimensions(), (120, 90));
        // Cell 40x45 plus 14 pixels of padding on every side.
        for piece in &pack.pieces {
            assert_eq!(piece.image.dimensions(), (68, 73));
        }
        assert_eq!(pack.pieces[0].row, 0);
        assert_eq!(pack.pieces[5].col, 2);

        let again = PuzzleCutter::new(source, 6)
            .profile(ProfileKind::Rectangular)
            .seed(42)
            .cut()
            .expect("cut failed");
        for (a, b) in pack.pieces.iter().zip(again.pieces.iter()) {
            assert_eq!(a.image.as_raw(), b.image.as_raw());
        }
    }

    #[test]
    fn test_cut_single_piece_is_the_whole_photo() {
        let blue = Rgba([0, 0, 200, 255]);
        let source = DynamicImage::ImageRgba8(solid_image(120, 90, blue));
        let pack = PuzzleCutter::new(source, 1).cut().expect("cut failed");

        assert_eq!((pack.grid.rows, pack.grid.cols), (1, 1));
        assert_eq!(pack.pieces.len(), 1);
        let piece = &pack.pieces[0];
        // All four sides flat, cell is the full photo plus curved-profile padding.
        assert_eq!(piece.image.dimensions(), (120 + 2 * 48, 90 + 2 * 48));
        assert_eq!(*piece.image.get_pixel(48 + 60, 48 + 45), blue);
        assert_eq!(*piece.image.get_pixel(50, 50), blue);
    }

    #[test]
    fn test_cut_zero_piece_count_uses_default() {
        let source = DynamicImage::ImageRgba8(solid_image(120, 90, Rgba([10, 10, 10, 255])));
        let pack = PuzzleCutter::new(source, 0).cut().expect("cut failed");
        // Default of 20 requested pieces plans a 3x6 grid on a 4:3 photo.
        assert_eq!((pack.grid.rows, pack.grid.cols), (3, 6));
        assert_eq!(pack.pieces.len(), 18);
    }

    #[test]
    fn test_cut_downsamples_large_photos() {
        let source = DynamicImage::ImageRgba8(solid_image(400, 200, Rgba([77, 77, 77, 255])));
        let pack = PuzzleCutter::new(source, 4)
            .max_dimension(100)
            .seed(1)
            .cut()
            .expect("cut failed");
        assert_eq!(pack.processed_image.dimensions(), (100, 50));
        assert_eq!(pack.guide.dimensions(), (100, 50));
    }

    #[test]
    fn test_from_rgba8_rejects_bad_buffer() {
        assert!(PuzzleCutter::from_rgba8(10, 10, &[0u8; 16], 4).is_err());
        assert!(PuzzleCutter::from_rgba8(2, 2, &[255u8; 16], 4).is_ok());
    }
}
