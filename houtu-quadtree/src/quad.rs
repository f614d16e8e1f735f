//! Side and quadrant numbering shared by nodes, neighbours and edge stitching.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::North, Side::East, Side::South, Side::West];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Side {
        Side::ALL[i & 3]
    }

    pub fn opposite(self) -> Side {
        OPSIDE[self.index()]
    }

    /// East and west edges are columns of the vertex grid.
    pub fn is_vertical(self) -> bool {
        matches!(self, Side::East | Side::West)
    }
}

pub const OPSIDE: [Side; 4] = [Side::South, Side::West, Side::North, Side::East];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Quadrant {
        Quadrant::ALL[i & 3]
    }

    /// Sibling lying on `side` of this quadrant, if it shares the parent.
    pub fn neighbour(self, side: Side) -> Option<Quadrant> {
        NEIGHBOUR[side.index()][self.index()]
    }

    /// Quadrant mirrored across the axis perpendicular to `side`.
    pub fn mirrored(self, side: Side) -> Quadrant {
        OPPART[side.index()][self.index()]
    }

    /// 0 or 1: which half of the parent edge `side` this quadrant touches,
    /// counted west to east for N/S and north to south for E/W.
    pub fn offset_along(self, side: Side) -> u32 {
        PARTOFFSET[self.index()][side.index()]
    }
}

const NW: Option<Quadrant> = Some(Quadrant::NorthWest);
const NE: Option<Quadrant> = Some(Quadrant::NorthEast);
const SW: Option<Quadrant> = Some(Quadrant::SouthWest);
const SE: Option<Quadrant> = Some(Quadrant::SouthEast);

/// `[side][part]`
pub const NEIGHBOUR: [[Option<Quadrant>; 4]; 4] = [
    [None, None, NW, NE],
    [NE, None, SE, None],
    [SW, SE, None, None],
    [None, NW, None, SW],
];

/// `[side][part]`
pub const OPPART: [[Quadrant; 4]; 4] = {
    use Quadrant::*;
    [
        [SouthWest, SouthEast, NorthWest, NorthEast],
        [NorthEast, NorthWest, SouthEast, SouthWest],
        [SouthWest, SouthEast, NorthWest, NorthEast],
        [NorthEast, NorthWest, SouthEast, SouthWest],
    ]
};

/// `[part][side]`
pub const PARTOFFSET: [[u32; 4]; 4] = [[0, 0, 0, 0], [1, 0, 1, 0], [0, 1, 0, 1], [1, 1, 1, 1]];

/// Per-frame traversal state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Visited on the way down this frame.
    Walkthrough,
    Rendering,
    NotRendering,
    /// Terrain was driven for the node but it is not drawn.
    TerrainOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_sides() {
        for side in Side::ALL {
            assert_ne!(side, side.opposite());
            assert_eq!(side, side.opposite().opposite());
        }
        assert_eq!(Side::North.opposite(), Side::South);
        assert_eq!(Side::East.opposite(), Side::West);
    }

    #[test]
    fn neighbours_are_mutual() {
        for side in Side::ALL {
            for part in Quadrant::ALL {
                if let Some(n) = part.neighbour(side) {
                    assert_eq!(n.neighbour(side.opposite()), Some(part));
                    assert_eq!(part.mirrored(side), n);
                }
            }
        }
    }

    #[test]
    fn offsets_follow_position() {
        assert_eq!(Quadrant::NorthEast.offset_along(Side::North), 1);
        assert_eq!(Quadrant::NorthEast.offset_along(Side::East), 0);
        assert_eq!(Quadrant::SouthWest.offset_along(Side::West), 1);
        assert_eq!(Quadrant::SouthWest.offset_along(Side::South), 0);
    }
}
