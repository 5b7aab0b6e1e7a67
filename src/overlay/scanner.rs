//! Heuristic detection of injected "assistance" overlays.
//!
//! An element is suspicious when it is not whitelisted, is large enough to
//! matter, and floats (high stacking order), is see-through (opacity inside
//! the configured band) or carries a suspicious id/class token. Flagged
//! elements land in a set keyed by stable identity, which only grows when a
//! new element shows up, and in a chronological log that grows on every
//! scan that still sees them.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::models::{OverlayDetection, OverlayReason, OverlaySummary};

use super::{ElementNode, ScannerProfile};

pub struct OverlayAnomalyScanner {
    profile: ScannerProfile,
    flagged: HashMap<String, OverlayDetection>,
    log: VecDeque<OverlayDetection>,
    max_log: usize,
    evicted: usize,
}

impl OverlayAnomalyScanner {
    pub fn new(profile: ScannerProfile, max_log: usize) -> Self {
        Self {
            profile,
            flagged: HashMap::new(),
            log: VecDeque::new(),
            max_log: max_log.max(1),
            evicted: 0,
        }
    }

    /// Signals that hold for `node`, strongest first, or `None` when the
    /// element is not suspicious.
    pub fn evaluate(&self, node: &ElementNode) -> Option<Vec<OverlayReason>> {
        let profile = &self.profile;

        if node
            .identifying_tokens()
            .any(|token| ScannerProfile::matches_segments(&profile.whitelist_tokens, token))
        {
            return None;
        }

        if node.width < profile.min_width || node.height < profile.min_height {
            return None;
        }

        let mut signals = Vec::with_capacity(4);
        if node
            .identifying_tokens()
            .any(|token| ScannerProfile::matches_any(&profile.suspicious_tokens, token))
        {
            signals.push(OverlayReason::SuspiciousToken);
        }
        if node.z_index.is_some_and(|z| z >= profile.min_z_index) {
            signals.push(OverlayReason::ZIndex);
        }
        if (profile.min_opacity..=profile.max_opacity).contains(&node.opacity) {
            signals.push(OverlayReason::Opacity);
        }

        if signals.is_empty() {
            return None;
        }
        signals.push(OverlayReason::Size);
        Some(signals)
    }

    /// Walks the visible tree once. Returns how many elements were flagged
    /// by this pass.
    pub fn scan(&mut self, roots: &[ElementNode], now: DateTime<Utc>) -> usize {
        let mut pending: Vec<&ElementNode> = roots.iter().rev().collect();
        let mut flagged_this_pass = 0;

        while let Some(node) = pending.pop() {
            // Hidden subtrees are not rendered.
            if !node.visible {
                continue;
            }
            pending.extend(node.children.iter().rev());

            let Some(signals) = self.evaluate(node) else {
                continue;
            };
            flagged_this_pass += 1;

            let detection = OverlayDetection {
                element_key: node.key.clone(),
                element_descriptor: node.descriptor(),
                reason: signals[0],
                signals,
                detected_at: now,
            };

            if !self.flagged.contains_key(&node.key) {
                log::info!(
                    "overlay flagged: {} ({:?})",
                    detection.element_descriptor,
                    detection.reason
                );
            }
            self.flagged.insert(node.key.clone(), detection.clone());
            self.append_log(detection);
        }

        flagged_this_pass
    }

    fn append_log(&mut self, detection: OverlayDetection) {
        self.log.push_back(detection);
        while self.log.len() > self.max_log {
            self.log.pop_front();
            self.evicted += 1;
        }
    }

    pub fn unique_elements(&self) -> usize {
        self.flagged.len()
    }

    /// Detections ever logged, including entries evicted from the bounded log.
    pub fn total_detections(&self) -> usize {
        self.evicted + self.log.len()
    }

    pub fn is_flagged(&self, key: &str) -> bool {
        self.flagged.contains_key(key)
    }

    pub fn detection_summary(&self, now: DateTime<Utc>) -> OverlaySummary {
        OverlaySummary {
            total_detections: self.total_detections(),
            unique_elements: self.unique_elements(),
            detections: self.log.iter().cloned().collect(),
            timestamp: now,
        }
    }
}
