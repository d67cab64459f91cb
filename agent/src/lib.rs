use anyhow::bail;
use itertools::Itertools;
use rand::Rng;
use rand::prelude::IndexedRandom;
use std::collections::HashSet;

/// Represents a 2D coordinate on the minesweeper board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Point {
    pub row: usize,
    pub col: usize,
}

impl Point {
    /// All in-bounds cells within one row and column of this one,
    /// not including the cell itself. Edges and corners are clipped.
    pub fn neighbors(self, height: usize, width: usize) -> impl Iterator<Item = Point> {
        let (row, col) = (self.row as isize, self.col as isize);
        (row - 1..=row + 1)
            .cartesian_product(col - 1..=col + 1)
            .filter(move |&pos| pos != (row, col))
            .filter(move |&(r, c)| {
                r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width
            })
            .map(|(r, c)| Point {
                row: r as usize,
                col: c as usize,
            })
    }
}

// --- Board (the oracle) ---

/// The hidden board: geometry plus the ground-truth mine set.
///
/// The board never takes part in inference. It answers two questions:
/// `reveal` gives the adjacent-mine count that feeds observations to the
/// agent, and `is_mine` is ground truth for verification and scoring only.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Board {
    pub height: usize,
    pub width: usize,
    mines: HashSet<Point>,
}

impl Board {
    /// Creates a board with `mine_count` mines placed uniformly at random.
    pub fn new(height: usize, width: usize, mine_count: usize, rng: &mut impl Rng) -> Self {
        if mine_count >= height * width {
            panic!("Mine count must be less than the number of cells on the board.");
        }
        let mut mines = HashSet::new();
        while mines.len() < mine_count {
            mines.insert(Point {
                row: rng.random_range(0..height),
                col: rng.random_range(0..width),
            });
        }
        Board {
            height,
            width,
            mines,
        }
    }

    /// Creates a board with a fixed mine placement, for tests and replays.
    pub fn with_mines(height: usize, width: usize, mines: HashSet<Point>) -> Self {
        Board {
            height,
            width,
            mines,
        }
    }

    pub fn total_mines(&self) -> usize {
        self.mines.len()
    }

    pub fn is_mine(&self, cell: Point) -> bool {
        self.mines.contains(&cell)
    }

    /// Returns the number of mines adjacent to `cell`.
    ///
    /// Callers must only reveal cells they have proven safe, or accept the
    /// loss on a guess by checking `is_mine` beforehand. Revealing a mine
    /// violates that contract and fails hard.
    pub fn reveal(&self, cell: Point) -> anyhow::Result<u8> {
        if self.is_mine(cell) {
            bail!("revealed_mine");
        }
        let count = cell
            .neighbors(self.height, self.width)
            .filter(|n| self.mines.contains(n))
            .count();
        Ok(count as u8)
    }

    /// Deserializes a board from bytes.
    pub fn deserialize(bts: &[u8]) -> Self {
        bcs::from_bytes(bts).unwrap()
    }

    /// Serializes the board to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        bcs::to_bytes(self).unwrap()
    }
}

// --- Sentence ---

/// A single logical constraint: exactly `count` of `cells` are mines.
///
/// Sentences shrink in place as cells are confirmed one way or the other,
/// and are discarded once no cells remain. Two sentences are equal iff
/// their cell sets and counts are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub cells: HashSet<Point>,
    pub count: usize,
}

impl Sentence {
    pub fn new(cells: HashSet<Point>, count: usize) -> Self {
        Sentence { cells, count }
    }

    /// Every cell here is a mine when the count covers the whole set.
    pub fn known_mines(&self) -> HashSet<Point> {
        if self.count == self.cells.len() {
            self.cells.clone()
        } else {
            HashSet::new()
        }
    }

    /// Every cell here is safe when the count is zero.
    pub fn known_safes(&self) -> HashSet<Point> {
        if self.count == 0 {
            self.cells.clone()
        } else {
            HashSet::new()
        }
    }

    /// Removes a confirmed mine from the constraint. The floor on `count`
    /// is never hit for a consistent oracle; it only keeps a bad input
    /// from wrapping.
    pub fn mark_mine(&mut self, cell: Point) {
        if self.cells.remove(&cell) {
            self.count = self.count.saturating_sub(1);
        }
    }

    /// Removes a confirmed safe cell from the constraint; the mine count
    /// is unaffected.
    pub fn mark_safe(&mut self, cell: Point) {
        self.cells.remove(&cell);
    }

    /// A resolved sentence has no cells left and carries no information.
    pub fn is_resolved(&self) -> bool {
        self.cells.is_empty()
    }
}

// --- Knowledge base ---

/// The evolving collection of sentences plus the two derived global sets.
///
/// `mines` and `safes` hold every cell proven one way or the other. They
/// only ever grow, and they stay disjoint: a collision between them means
/// the observations were inconsistent, which is surfaced as an error
/// rather than papered over.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    knowledge: Vec<Sentence>,
    mines: HashSet<Point>,
    safes: HashSet<Point>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells proven to contain a mine.
    pub fn mines(&self) -> &HashSet<Point> {
        &self.mines
    }

    /// Cells proven mine-free.
    pub fn safes(&self) -> &HashSet<Point> {
        &self.safes
    }

    /// Records `cell` as a mine and folds the fact into every live sentence.
    pub fn mark_mine(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.safes.contains(&cell) {
            bail!("contradiction");
        }
        if self.mines.insert(cell) {
            for sentence in &mut self.knowledge {
                sentence.mark_mine(cell);
            }
        }
        Ok(())
    }

    /// Records `cell` as safe and folds the fact into every live sentence.
    pub fn mark_safe(&mut self, cell: Point) -> anyhow::Result<()> {
        if self.mines.contains(&cell) {
            bail!("contradiction");
        }
        if self.safes.insert(cell) {
            for sentence in &mut self.knowledge {
                sentence.mark_safe(cell);
            }
        }
        Ok(())
    }

    /// The central update, invoked once per revealed cell.
    ///
    /// `frontier` is the revealed cell's unexplored neighborhood, computed
    /// by the agent since the agent owns the move history. The revealed
    /// cell is marked safe, the frontier becomes a new sentence, and
    /// propagation runs to fixpoint before returning. A `count` the
    /// frontier cannot accommodate means the oracle is lying and fails
    /// hard; clamping it would hide a real inconsistency.
    pub fn observe(
        &mut self,
        cell: Point,
        count: usize,
        frontier: HashSet<Point>,
    ) -> anyhow::Result<()> {
        self.mark_safe(cell)?;
        if count > frontier.len() {
            bail!("count_out_of_range");
        }
        // A zero-count sentence still carries information; it resolves to
        // known-safes on the first propagation pass.
        if !frontier.is_empty() {
            self.knowledge.push(Sentence::new(frontier, count));
        }
        self.propagate()
    }

    /// Saturating propagation: repeat until a full pass derives nothing.
    ///
    /// Each pass harvests fully-determined sentences, folds the discovered
    /// facts into every sentence, drops resolved sentences, and runs
    /// subset resolution over the survivors. Termination is enforced by
    /// the per-pass `changed` flag: the universe of distinct sentences
    /// over a finite board is finite, and facts only accumulate.
    fn propagate(&mut self) -> anyhow::Result<()> {
        loop {
            let mut changed = false;

            // Fold previously established facts into any sentence still
            // naming them. A sentence built from a fresh observation can
            // mention cells that were decided long before it existed.
            let (knowledge, mines, safes) = (&mut self.knowledge, &self.mines, &self.safes);
            for sentence in knowledge {
                let stale_mines: Vec<Point> = sentence.cells.intersection(mines).copied().collect();
                for cell in stale_mines {
                    sentence.mark_mine(cell);
                    changed = true;
                }
                let stale_safes: Vec<Point> = sentence.cells.intersection(safes).copied().collect();
                for cell in stale_safes {
                    sentence.mark_safe(cell);
                    changed = true;
                }
            }

            // Harvest discoveries before mutating anything, so every
            // sentence is read in the state the previous pass left it in.
            let mut found_mines = HashSet::new();
            let mut found_safes = HashSet::new();
            for sentence in &self.knowledge {
                found_mines.extend(sentence.known_mines());
                found_safes.extend(sentence.known_safes());
            }
            for mine in found_mines {
                if !self.mines.contains(&mine) {
                    self.mark_mine(mine)?;
                    changed = true;
                }
            }
            for safe in found_safes {
                if !self.safes.contains(&safe) {
                    self.mark_safe(safe)?;
                    changed = true;
                }
            }

            // Drop resolved sentences. An empty sentence still owing mines
            // is a logical contradiction in the input.
            let mut kept = Vec::with_capacity(self.knowledge.len());
            for sentence in self.knowledge.drain(..) {
                if sentence.is_resolved() {
                    if sentence.count > 0 {
                        bail!("contradiction");
                    }
                    changed = true;
                } else {
                    kept.push(sentence);
                }
            }
            self.knowledge = kept;

            // Subset resolution: when A is contained in B, the cells of B
            // outside A must hold exactly B.count - A.count mines.
            // Derivations are collected first and appended after the scan,
            // so the sentence list is never mutated mid-iteration.
            let mut derived: Vec<Sentence> = Vec::new();
            for (i, a) in self.knowledge.iter().enumerate() {
                for (j, b) in self.knowledge.iter().enumerate() {
                    if i == j || !a.cells.is_subset(&b.cells) {
                        continue;
                    }
                    let Some(count) = b.count.checked_sub(a.count) else {
                        bail!("contradiction");
                    };
                    let cells: HashSet<Point> = b.cells.difference(&a.cells).copied().collect();
                    if cells.is_empty() {
                        // Identical cell sets. Differing counts cannot both
                        // hold; equal counts derive nothing.
                        if count > 0 {
                            bail!("contradiction");
                        }
                        continue;
                    }
                    if count > cells.len() {
                        bail!("contradiction");
                    }
                    let candidate = Sentence::new(cells, count);
                    if !self.knowledge.contains(&candidate) && !derived.contains(&candidate) {
                        derived.push(candidate);
                    }
                }
            }
            if !derived.is_empty() {
                self.knowledge.extend(derived);
                changed = true;
            }

            if !changed {
                return Ok(());
            }
        }
    }
}

// --- Agent (move selection) ---

/// The playing agent: move history plus the sole knowledge base instance.
pub struct Agent {
    height: usize,
    width: usize,
    moves_made: HashSet<Point>,
    kb: KnowledgeBase,
}

impl Agent {
    pub fn new(height: usize, width: usize) -> Self {
        Agent {
            height,
            width,
            moves_made: HashSet::new(),
            kb: KnowledgeBase::new(),
        }
    }

    /// Feeds one observation from the board into the knowledge base: the
    /// cell just revealed and the count of mines adjacent to it.
    ///
    /// The sentence built here covers the revealed cell's in-bounds
    /// neighborhood minus cells already played, which are safe and
    /// contribute nothing. Re-observing a cell is harmless; the sets
    /// de-duplicate.
    pub fn add_knowledge(&mut self, cell: Point, count: usize) -> anyhow::Result<()> {
        self.moves_made.insert(cell);
        let frontier: HashSet<Point> = cell
            .neighbors(self.height, self.width)
            .filter(|n| !self.moves_made.contains(n))
            .collect();
        self.kb.observe(cell, count, frontier)
    }

    /// Records a revealed cell without feeding an observation.
    pub fn record_move(&mut self, cell: Point) {
        self.moves_made.insert(cell);
    }

    /// Marks a cell as a mine on external authority (e.g. a flag placed by
    /// a supervising player), reaching every live sentence immediately.
    pub fn mark_confirmed_mine(&mut self, cell: Point) -> anyhow::Result<()> {
        self.kb.mark_mine(cell)
    }

    /// Marks a cell as safe on external authority.
    pub fn mark_confirmed_safe(&mut self, cell: Point) -> anyhow::Result<()> {
        self.kb.mark_safe(cell)
    }

    /// Any cell proven safe and not yet played. `None` means no move is
    /// logically forced and the caller must fall back to guessing.
    pub fn choose_safe_move(&self) -> Option<Point> {
        self.kb
            .safes()
            .iter()
            .copied()
            .find(|cell| !self.moves_made.contains(cell) && !self.kb.mines().contains(cell))
    }

    /// A uniformly random cell that has not been played and is not a known
    /// mine. `None` once every such cell is exhausted.
    pub fn choose_guess_move(&self, rng: &mut impl Rng) -> Option<Point> {
        let candidates: Vec<Point> = (0..self.height)
            .cartesian_product(0..self.width)
            .map(|(row, col)| Point { row, col })
            .filter(|cell| !self.moves_made.contains(cell) && !self.kb.mines().contains(cell))
            .collect();
        candidates.choose(rng).copied()
    }

    pub fn mines(&self) -> &HashSet<Point> {
        self.kb.mines()
    }

    pub fn safes(&self) -> &HashSet<Point> {
        self.kb.safes()
    }

    pub fn moves_made(&self) -> &HashSet<Point> {
        &self.moves_made
    }
}
