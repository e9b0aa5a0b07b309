use crate::error::{Result, ToneWarpError};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Extended DTMF symbol table with 35 symbols (7 low × 5 high frequencies)
///
/// Frequency design:
/// - Low frequencies (7): the four classic DTMF rows plus 1033, 1125, 1218 Hz
/// - High frequencies (5): the four classic DTMF columns plus 1944 Hz
/// - Alphabet: A-Z then 0-8, filled row by row

/// Low frequency band (7 frequencies)
pub const LOW_FREQS: [f32; 7] = [697.0, 770.0, 852.0, 941.0, 1033.0, 1125.0, 1218.0];

/// High frequency band (5 frequencies)
pub const HIGH_FREQS: [f32; 5] = [1336.0, 1477.0, 1633.0, 1785.0, 1944.0];

/// Character matrix, rows indexed by low tone, columns by high tone
const EXTENDED_MATRIX: [[char; 5]; 7] = [
    ['A', 'B', 'C', 'D', 'E'],
    ['F', 'G', 'H', 'I', 'J'],
    ['K', 'L', 'M', 'N', 'O'],
    ['P', 'Q', 'R', 'S', 'T'],
    ['U', 'V', 'W', 'X', 'Y'],
    ['Z', '0', '1', '2', '3'],
    ['4', '5', '6', '7', '8'],
];

static STANDARD_TABLE: OnceLock<SymbolTable> = OnceLock::new();

/// A (low, high) tone pair in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyPair {
    pub low: f32,
    pub high: f32,
}

impl FrequencyPair {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }
}

/// Bidirectional character <-> tone pair mapping
///
/// Never mutated after construction. The standard table is shared process-wide
/// through [`SymbolTable::standard`].
#[derive(Debug, Clone)]
pub struct SymbolTable {
    low: Vec<f32>,
    high: Vec<f32>,
    cells: Vec<Vec<Option<char>>>,
    index: HashMap<char, (usize, usize)>,
}

impl SymbolTable {
    /// The standard 7×5 extended table
    pub fn standard() -> &'static SymbolTable {
        STANDARD_TABLE.get_or_init(|| {
            let cells = EXTENDED_MATRIX
                .iter()
                .map(|row| row.iter().map(|&c| Some(c)).collect())
                .collect();
            Self::assemble(LOW_FREQS.to_vec(), HIGH_FREQS.to_vec(), cells)
        })
    }

    /// Build a custom table. `cells[row][col]` is the symbol at
    /// (`low[row]`, `high[col]`), `None` leaves the slot unpopulated.
    pub fn new(low: &[f32], high: &[f32], cells: Vec<Vec<Option<char>>>) -> Result<Self> {
        Self::build(low.to_vec(), high.to_vec(), cells)
    }

    fn build(low: Vec<f32>, high: Vec<f32>, cells: Vec<Vec<Option<char>>>) -> Result<Self> {
        if low.is_empty() || high.is_empty() {
            return Err(ToneWarpError::InvalidConfig("empty frequency band".into()));
        }
        if cells.len() != low.len() || cells.iter().any(|row| row.len() != high.len()) {
            return Err(ToneWarpError::InvalidConfig(format!(
                "symbol matrix must be {}x{}",
                low.len(),
                high.len()
            )));
        }
        let low_max = low.iter().cloned().fold(f32::MIN, f32::max);
        let high_min = high.iter().cloned().fold(f32::MAX, f32::min);
        if low_max >= high_min {
            return Err(ToneWarpError::InvalidConfig(
                "low and high bands overlap".into(),
            ));
        }

        let populated = cells.iter().flatten().filter(|c| c.is_some()).count();
        let table = Self::assemble(low, high, cells);
        if table.index.len() != populated {
            return Err(ToneWarpError::InvalidConfig(
                "symbol matrix contains duplicate characters".into(),
            ));
        }
        Ok(table)
    }

    fn assemble(low: Vec<f32>, high: Vec<f32>, cells: Vec<Vec<Option<char>>>) -> Self {
        let mut index = HashMap::new();
        for (row, cols) in cells.iter().enumerate() {
            for (col, cell) in cols.iter().enumerate() {
                if let Some(c) = cell {
                    index.entry(*c).or_insert((row, col));
                }
            }
        }
        Self {
            low,
            high,
            cells,
            index,
        }
    }

    /// Map a character to its tone pair. ASCII lowercase without an entry of
    /// its own folds to uppercase.
    pub fn encode(&self, c: char) -> Result<FrequencyPair> {
        self.index
            .get(&c)
            .or_else(|| self.index.get(&c.to_ascii_uppercase()))
            .map(|&(row, col)| FrequencyPair::new(self.low[row], self.high[col]))
            .ok_or(ToneWarpError::UnsupportedSymbol(c))
    }

    /// Map a measured tone pair to the nearest table entry.
    ///
    /// Each tone must lie within `tolerance_hz` of a table frequency and the
    /// resulting cell must be populated.
    pub fn decode(&self, pair: FrequencyPair, tolerance_hz: f32) -> Result<char> {
        let no_match = || ToneWarpError::NoMatch {
            low: pair.low,
            high: pair.high,
        };
        let row = nearest_within(&self.low, pair.low, tolerance_hz).ok_or_else(no_match)?;
        let col = nearest_within(&self.high, pair.high, tolerance_hz).ok_or_else(no_match)?;
        self.cells[row][col].ok_or_else(no_match)
    }

    /// All symbols in matrix order
    pub fn alphabet(&self) -> impl Iterator<Item = char> + '_ {
        self.cells.iter().flatten().filter_map(|c| *c)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn low_freqs(&self) -> &[f32] {
        &self.low
    }

    pub fn high_freqs(&self) -> &[f32] {
        &self.high
    }

    /// Smallest spacing between two tones of the same band
    pub fn min_separation(&self) -> f32 {
        min_spacing(&self.low).min(min_spacing(&self.high))
    }
}

fn nearest_within(freqs: &[f32], target: f32, tolerance: f32) -> Option<usize> {
    let (idx, dist) = freqs
        .iter()
        .enumerate()
        .map(|(i, &f)| (i, (f - target).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    (dist <= tolerance).then_some(idx)
}

fn min_spacing(freqs: &[f32]) -> f32 {
    let mut sorted = freqs.to_vec();
    sorted.sort_by(f32::total_cmp);
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f32::INFINITY, f32::min)
}
