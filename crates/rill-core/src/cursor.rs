use std::fmt;

/// Root container an element tree branch hangs off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootContainer {
    Main,
    Sidebar,
    Event,
}

impl fmt::Display for RootContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootContainer::Main => f.write_str("main"),
            RootContainer::Sidebar => f.write_str("sidebar"),
            RootContainer::Event => f.write_str("event"),
        }
    }
}

/// Tree coordinate of one element: container, ancestor block indices, and
/// the child slot within the innermost block.
///
/// A node's identity for diffing purposes is its coordinate, not its
/// content; revisiting a coordinate replaces the node in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub container: RootContainer,
    pub path: Vec<u32>,
    pub index: u32,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.container)?;
        for segment in &self.path {
            write!(f, "{segment}.")?;
        }
        write!(f, "{}", self.index)
    }
}

/// Mutable insertion pointer for one branch of the element tree.
///
/// Advances by one slot per element emitted, so an unchanged script produces
/// an identical coordinate sequence on every run.
#[derive(Clone, Debug)]
pub struct RunningCursor {
    container: RootContainer,
    path: Vec<u32>,
    index: u32,
}

impl RunningCursor {
    pub fn root(container: RootContainer) -> Self {
        Self {
            container,
            path: Vec::new(),
            index: 0,
        }
    }

    /// A cursor positioned at the first child slot of the block at `path`.
    pub fn at(container: RootContainer, path: Vec<u32>) -> Self {
        Self {
            container,
            path,
            index: 0,
        }
    }

    pub fn container(&self) -> RootContainer {
        self.container
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }

    /// The coordinate the next emitted element will occupy.
    pub fn peek(&self) -> Coordinate {
        Coordinate {
            container: self.container,
            path: self.path.clone(),
            index: self.index,
        }
    }

    /// Claims the current slot and advances to the next one.
    pub fn take_coordinate(&mut self) -> Coordinate {
        let coordinate = self.peek();
        self.index += 1;
        coordinate
    }

    /// A fresh running cursor scoped to the children of the block created at
    /// `coordinate`.
    pub fn child_of(coordinate: &Coordinate) -> RunningCursor {
        let mut path = coordinate.path.clone();
        path.push(coordinate.index);
        RunningCursor {
            container: coordinate.container,
            path,
            index: 0,
        }
    }
}

/// Frozen snapshot addressing exactly the element created by one call, used
/// to target later appends at the same tree coordinate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedCursor {
    coordinate: Coordinate,
}

impl LockedCursor {
    /// Binds a locked cursor to an arbitrary coordinate. The coordinate is
    /// only a valid append target if an element was actually created there.
    pub fn at(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
}
