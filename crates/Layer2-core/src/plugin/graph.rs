//! Dependency Graph - 플러그인 의존성 그래프
//!
//! 디스크립터 집합이 바뀔 때마다 `build()`로 통째로 다시 만든다 (부분 갱신 없음).
//! 간선 방향은 dependent → dependency 이고, 카탈로그에 없는 대상으로 가는
//! 간선은 dangling으로 따로 보관한다.

use super::manifest::PluginDescriptor;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// 순환 감지 결과 (첫 ID가 마지막에 반복됨)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle: {}", .cycle.join(" -> "))]
pub struct CycleDetected {
    pub cycle: Vec<String>,
}

/// 의존성 간선
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub dependent: String,
    pub dependency: String,
    pub range: String,
}

/// 의존성 그래프
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 카탈로그에 있는 모든 플러그인 ID
    nodes: BTreeSet<String>,

    /// dependent → 선언 순서의 간선 (dangling 포함)
    edges: BTreeMap<String, Vec<Edge>>,

    /// dependency → dependents (카탈로그에 있는 대상만)
    reverse: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// 디스크립터 집합으로 그래프 생성
    pub fn build<'a>(descriptors: impl IntoIterator<Item = &'a PluginDescriptor>) -> Self {
        let descriptors: Vec<&PluginDescriptor> = descriptors.into_iter().collect();
        let nodes: BTreeSet<String> = descriptors.iter().map(|d| d.id.clone()).collect();

        let mut edges: BTreeMap<String, Vec<Edge>> = BTreeMap::new();
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for descriptor in &descriptors {
            let list = edges.entry(descriptor.id.clone()).or_default();
            for dep in &descriptor.dependencies {
                list.push(Edge {
                    dependent: descriptor.id.clone(),
                    dependency: dep.plugin_id.clone(),
                    range: dep.range.clone(),
                });
                if nodes.contains(&dep.plugin_id) {
                    reverse
                        .entry(dep.plugin_id.clone())
                        .or_default()
                        .insert(descriptor.id.clone());
                }
            }
        }

        Self { nodes, edges, reverse }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 선언된 간선 (dangling 포함)
    pub fn edges_of(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 카탈로그에 있는 직접 의존성
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges_of(id)
            .iter()
            .filter(|e| self.nodes.contains(&e.dependency))
            .map(|e| e.dependency.as_str())
            .collect()
    }

    /// 직접 dependents
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.reverse
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// 카탈로그에 없는 대상을 가리키는 간선
    pub fn dangling_edges(&self) -> Vec<&Edge> {
        self.edges
            .values()
            .flatten()
            .filter(|e| !self.nodes.contains(&e.dependency))
            .collect()
    }

    /// 모든 전이적 dependents (자기 자신 제외)
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(current) {
                if dependent != id && found.insert(dependent.to_string()) {
                    queue.push_back(dependent);
                }
            }
        }

        found
    }

    /// 전이적 의존성 + 자기 자신을 로드 순서로 반환
    pub fn dependency_closure(&self, id: &str) -> Result<Vec<String>, CycleDetected> {
        let mut closure = BTreeSet::from([id.to_string()]);
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for dep in self.dependencies_of(current) {
                if closure.insert(dep.to_string()) {
                    queue.push_back(dep);
                }
            }
        }

        self.order_subset(&closure)
    }

    // ========================================================================
    // 순환 감지
    // ========================================================================

    /// 첫 번째 순환을 찾아 반환 (DFS + 재귀 스택)
    pub fn detect_cycles(&self) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        for id in &self.nodes {
            if visited.contains(id) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = self.dfs_cycle(id, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// 특정 플러그인에서 도달 가능한 순환
    pub fn cycle_reachable_from(&self, id: &str) -> Option<Vec<String>> {
        if !self.nodes.contains(id) {
            return None;
        }
        let mut visited = BTreeSet::new();
        let mut stack = Vec::new();
        self.dfs_cycle(id, &mut visited, &mut stack)
    }

    fn dfs_cycle(
        &self,
        id: &str,
        visited: &mut BTreeSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(id.to_string());
        stack.push(id.to_string());

        for dep in self.dependencies_of(id) {
            if let Some(pos) = stack.iter().position(|s| s == dep) {
                // back-edge: 스택에서 순환 경로 복원
                let mut cycle: Vec<String> = stack[pos..].to_vec();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = self.dfs_cycle(dep, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }

    /// 순환 위에 있는 모든 ID를 덮는 순환 목록
    ///
    /// 강하게 연결된 컴포넌트마다, 아직 포함되지 않은 노드에서 자기 자신으로
    /// 돌아오는 최단 경로를 찾아 추가한다.
    pub fn all_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();

        for component in self.strongly_connected_components() {
            let is_cycle = component.len() > 1
                || component
                    .iter()
                    .next()
                    .map(|id| self.dependencies_of(id).contains(&id.as_str()))
                    .unwrap_or(false);
            if !is_cycle {
                continue;
            }

            let mut covered: BTreeSet<String> = BTreeSet::new();
            for start in &component {
                if covered.contains(start) {
                    continue;
                }
                if let Some(cycle) = self.shortest_cycle_within(start, &component) {
                    covered.extend(cycle.iter().cloned());
                    cycles.push(cycle);
                }
            }
        }

        cycles
    }

    fn shortest_cycle_within(&self, start: &str, component: &BTreeSet<String>) -> Option<Vec<String>> {
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            for dep in self.dependencies_of(current) {
                if !component.contains(dep) {
                    continue;
                }
                if dep == start {
                    let mut path = vec![current];
                    let mut cursor = current;
                    while cursor != start {
                        cursor = *parent.get(cursor)?;
                        path.push(cursor);
                    }
                    path.reverse();
                    let mut cycle: Vec<String> = path.into_iter().map(String::from).collect();
                    cycle.push(start.to_string());
                    return Some(cycle);
                }
                if seen.insert(dep) {
                    parent.insert(dep, current);
                    queue.push_back(dep);
                }
            }
        }
        None
    }

    /// Tarjan SCC
    fn strongly_connected_components(&self) -> Vec<BTreeSet<String>> {
        struct State<'a> {
            index: usize,
            indices: BTreeMap<&'a str, usize>,
            lowlink: BTreeMap<&'a str, usize>,
            stack: Vec<&'a str>,
            on_stack: BTreeSet<&'a str>,
            components: Vec<BTreeSet<String>>,
        }

        fn visit<'a>(graph: &'a DependencyGraph, id: &'a str, state: &mut State<'a>) {
            state.indices.insert(id, state.index);
            state.lowlink.insert(id, state.index);
            state.index += 1;
            state.stack.push(id);
            state.on_stack.insert(id);

            for dep in graph.dependencies_of(id) {
                if !state.indices.contains_key(dep) {
                    visit(graph, dep, state);
                    let low = state.lowlink[dep].min(state.lowlink[id]);
                    state.lowlink.insert(id, low);
                } else if state.on_stack.contains(dep) {
                    let low = state.indices[dep].min(state.lowlink[id]);
                    state.lowlink.insert(id, low);
                }
            }

            if state.lowlink[id] == state.indices[id] {
                let mut component = BTreeSet::new();
                while let Some(member) = state.stack.pop() {
                    state.on_stack.remove(member);
                    component.insert(member.to_string());
                    if member == id {
                        break;
                    }
                }
                state.components.push(component);
            }
        }

        let mut state = State {
            index: 0,
            indices: BTreeMap::new(),
            lowlink: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        };

        for id in &self.nodes {
            if !state.indices.contains_key(id.as_str()) {
                visit(self, id, &mut state);
            }
        }

        state.components
    }

    // ========================================================================
    // 위상 정렬
    // ========================================================================

    /// 의존성이 먼저 오는 위상 순서 (동률은 ID 오름차순)
    pub fn topological_order(&self) -> Result<Vec<String>, CycleDetected> {
        self.order_subset(&self.nodes)
    }

    /// 로드 순서 (= 위상 순서)
    pub fn load_order(&self) -> Result<Vec<String>, CycleDetected> {
        self.topological_order()
    }

    /// 언로드 순서 (= 위상 순서의 역순)
    pub fn unload_order(&self) -> Result<Vec<String>, CycleDetected> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// 부분 집합의 위상 순서 (집합 밖으로 나가는 간선은 무시)
    pub fn order_subset(&self, subset: &BTreeSet<String>) -> Result<Vec<String>, CycleDetected> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for id in subset.iter().filter(|id| self.nodes.contains(*id)) {
            let degree = self
                .dependencies_of(id)
                .into_iter()
                .filter(|dep| subset.contains(*dep))
                .count();
            in_degree.insert(id.as_str(), degree);
        }

        // BTreeSet을 우선순위 큐로 사용 - 항상 가장 작은 ID부터
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for dependent in self.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() == in_degree.len() {
            return Ok(order);
        }

        // 정렬되지 못한 노드에서 시작하는 순환을 찾아 보고
        let remaining: BTreeSet<&str> = in_degree
            .keys()
            .copied()
            .filter(|id| !order.iter().any(|o| o.as_str() == *id))
            .collect();
        let cycle = remaining
            .iter()
            .find_map(|id| self.cycle_reachable_from(id))
            .unwrap_or_else(|| remaining.iter().map(|s| s.to_string()).collect());
        Err(CycleDetected { cycle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn plugin(id: &str, deps: &[&str]) -> PluginDescriptor {
        deps.iter().fold(
            PluginDescriptor::new(id, id, Version::new(1, 0, 0)),
            |d, dep| d.with_dependency(*dep, "*"),
        )
    }

    fn graph(specs: &[(&str, &[&str])]) -> DependencyGraph {
        let descriptors: Vec<PluginDescriptor> =
            specs.iter().map(|(id, deps)| plugin(id, deps)).collect();
        DependencyGraph::build(&descriptors)
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|o| o == id).unwrap()
    }

    #[test]
    fn test_topological_order_dependencies_first() {
        let g = graph(&[
            ("app", &["ui", "core"]),
            ("ui", &["core"]),
            ("core", &[]),
            ("theme", &["ui"]),
        ]);

        let order = g.load_order().unwrap();
        assert_eq!(order.len(), 4);
        for id in ["app", "ui", "theme"] {
            for dep in g.dependencies_of(id) {
                assert!(position(&order, dep) < position(&order, id));
            }
        }

        let unload = g.unload_order().unwrap();
        assert_eq!(unload.first(), order.last());
    }

    #[test]
    fn test_ties_broken_by_id() {
        let g = graph(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]);
        assert_eq!(g.topological_order().unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_detect_cycle_returns_full_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);

        let cycle = g.detect_cycles().unwrap();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);

        let err = g.load_order().unwrap_err();
        assert_eq!(err.cycle.first(), err.cycle.last());
        assert!(err.cycle.len() >= 3);
    }

    #[test]
    fn test_all_cycles_covers_every_cyclic_node() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["a", "c"]),
            ("c", &["b"]),
            ("x", &["y"]),
            ("y", &["x"]),
            ("free", &["a"]),
        ]);

        let covered: BTreeSet<String> = g.all_cycles().into_iter().flatten().collect();
        for id in ["a", "b", "c", "x", "y"] {
            assert!(covered.contains(id), "{} should be reported", id);
        }
        assert!(!covered.contains("free"));
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(&[("a", &["b"]), ("b", &[])]);
        assert!(g.detect_cycles().is_none());
        assert!(g.all_cycles().is_empty());
    }

    #[test]
    fn test_dangling_edges_are_ignored_for_ordering() {
        let g = graph(&[("a", &["missing"]), ("b", &["a"])]);
        assert_eq!(g.load_order().unwrap(), vec!["a", "b"]);
        assert_eq!(g.dangling_edges().len(), 1);
        assert_eq!(g.edges_of("a")[0].dependency, "missing");
        assert!(g.dependencies_of("a").is_empty());
    }

    #[test]
    fn test_closure_and_dependents() {
        let g = graph(&[
            ("app", &["ui"]),
            ("ui", &["core"]),
            ("core", &[]),
            ("other", &["core"]),
        ]);

        assert_eq!(g.dependency_closure("app").unwrap(), vec!["core", "ui", "app"]);

        let dependents = g.transitive_dependents("core");
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec!["app", "other", "ui"]
        );
    }

    #[test]
    fn test_subset_order_and_reachable_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        assert!(g.cycle_reachable_from("c").is_none());
        assert!(g.cycle_reachable_from("a").is_some());

        let subset = BTreeSet::from(["c".to_string()]);
        assert_eq!(g.order_subset(&subset).unwrap(), vec!["c"]);
    }
}
