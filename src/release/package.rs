//! Packages, releases and the release builder

use crate::error::{RelprovError, RelprovResult};
use crate::release::resolve::topological_order;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

/// Node of a package in its release's dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(NodeIndex);

impl PackageId {
    pub(crate) fn node(self) -> NodeIndex {
        self.0
    }

    /// Position in manifest order
    pub fn index(self) -> usize {
        self.0.index()
    }
}

impl From<NodeIndex> for PackageId {
    fn from(node: NodeIndex) -> Self {
        Self(node)
    }
}

/// A package of a release. Immutable once the release is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Local path of the package archive
    pub archive_path: PathBuf,
    /// SHA256 of the archive
    pub fingerprint: String,
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// A named, versioned collection of packages
///
/// Source packages are nodes of a directed graph with one edge per
/// dependency, pointing from the dependency to the package that needs it.
/// Nodes are never removed, so node indices follow manifest order.
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub version: String,
    graph: DiGraph<Package, ()>,
    compiled_packages: Vec<Package>,
    order: Vec<PackageId>,
}

impl Release {
    /// All source packages, in manifest order
    pub fn packages(&self) -> impl Iterator<Item = (PackageId, &Package)> + '_ {
        self.graph
            .node_indices()
            .map(move |idx| (PackageId(idx), &self.graph[idx]))
    }

    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Packages shipped already compiled
    pub fn compiled_packages(&self) -> &[Package] {
        &self.compiled_packages
    }

    /// Look up a package by id
    ///
    /// Ids are only handed out by the release that owns them, so indexing
    /// cannot go out of bounds for ids obtained from this release.
    pub fn package(&self, id: PackageId) -> &Package {
        &self.graph[id.node()]
    }

    /// Look up a source package by name
    pub fn find_by_name(&self, name: &str) -> Option<&Package> {
        self.package_id(name).map(|id| self.package(id))
    }

    pub fn package_id(&self, name: &str) -> Option<PackageId> {
        self.packages()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id)
    }

    /// Direct dependencies of a package, in manifest order
    pub fn dependencies(&self, id: PackageId) -> Vec<PackageId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Packages that depend directly on `id`, in manifest order
    pub fn dependents(&self, id: PackageId) -> Vec<PackageId> {
        self.neighbors(id, Direction::Outgoing)
    }

    pub fn dependency_count(&self, id: PackageId) -> usize {
        self.graph
            .neighbors_directed(id.node(), Direction::Incoming)
            .count()
    }

    fn neighbors(&self, id: PackageId, direction: Direction) -> Vec<PackageId> {
        let mut ids: Vec<PackageId> = self
            .graph
            .neighbors_directed(id.node(), direction)
            .map(PackageId)
            .collect();
        ids.sort();
        ids
    }

    /// Packages ordered so that each follows all of its dependencies.
    ///
    /// Independent packages keep their manifest order.
    pub fn resolved_package_dependencies(&self) -> &[PackageId] {
        &self.order
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Description of a package before it is placed in a release
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    pub archive_path: PathBuf,
    pub fingerprint: String,
    /// Names of direct dependencies
    pub dependencies: Vec<String>,
}

impl PackageSpec {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        archive_path: impl Into<PathBuf>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            archive_path: archive_path.into(),
            fingerprint: fingerprint.into(),
            dependencies: vec![],
        }
    }

    pub fn with_dependencies<S: AsRef<str>>(mut self, deps: &[S]) -> Self {
        self.dependencies = deps.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    fn into_package(self) -> (Package, Vec<String>) {
        let package = Package {
            name: self.name,
            version: self.version,
            archive_path: self.archive_path,
            fingerprint: self.fingerprint,
        };
        (package, self.dependencies)
    }
}

/// Builds a [`Release`], validating the dependency graph
#[derive(Debug, Clone)]
pub struct ReleaseBuilder {
    name: String,
    version: String,
    packages: Vec<PackageSpec>,
    compiled_packages: Vec<PackageSpec>,
}

impl ReleaseBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            packages: vec![],
            compiled_packages: vec![],
        }
    }

    pub fn package(mut self, spec: PackageSpec) -> Self {
        self.packages.push(spec);
        self
    }

    pub fn compiled_package(mut self, spec: PackageSpec) -> Self {
        self.compiled_packages.push(spec);
        self
    }

    /// Resolve dependency names to graph edges and check the graph is acyclic
    pub fn build(self) -> RelprovResult<Release> {
        let mut graph = DiGraph::with_capacity(self.packages.len(), self.packages.len());
        let mut by_name: HashMap<String, NodeIndex> = HashMap::new();
        let mut wanted = Vec::with_capacity(self.packages.len());

        for spec in self.packages {
            let (package, dependencies) = spec.into_package();
            let name = package.name.clone();
            let idx = graph.add_node(package);
            if by_name.insert(name.clone(), idx).is_some() {
                return Err(RelprovError::DuplicatePackage(name));
            }
            wanted.push((idx, dependencies));
        }

        for (idx, dependencies) in wanted {
            let mut seen = HashSet::new();
            for dep in dependencies {
                let Some(&from) = by_name.get(&dep) else {
                    return Err(RelprovError::UnknownDependency {
                        package: graph[idx].name.clone(),
                        dependency: dep,
                    });
                };
                if seen.insert(from) {
                    graph.add_edge(from, idx, ());
                }
            }
        }

        let order = topological_order(&graph)?;

        let mut compiled_names = HashSet::new();
        let mut compiled_packages = Vec::with_capacity(self.compiled_packages.len());
        for spec in self.compiled_packages {
            if !compiled_names.insert(spec.name.clone()) {
                return Err(RelprovError::DuplicatePackage(spec.name));
            }
            compiled_packages.push(spec.into_package().0);
        }

        Ok(Release {
            name: self.name,
            version: self.version,
            graph,
            compiled_packages,
            order,
        })
    }
}
