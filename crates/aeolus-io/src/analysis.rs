use std::time::{Duration, Instant};

use aeolus_runtime::{
    AnalysisRequest, AnalysisServiceError, Heatmap, WindComfortAnalysisService, WindRose,
};
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, ConfigError};

const ANALYSIS_TYPE: &str = "comfort";
const COMFORT_SCALE: &str = "lawson_lddc";
// error bodies are echoed into logs; keep them short
const MAX_ERROR_BODY: usize = 512;

/// Blocking client for the remote wind-comfort analysis endpoint.
pub struct HttpWindAnalysis {
    client: reqwest::blocking::Client,
    endpoint: String,
    project: Option<String>,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeightMaps<'a> {
    /// Row-major, `width * height` values.
    terrain_height_array: &'a [f32],
    building_and_terrain_height_array: &'a [f32],
    min_height: f32,
    max_height: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    height_maps: HeightMaps<'a>,
    wind_rose: &'a WindRose,
    #[serde(rename = "type")]
    kind: &'static str,
    roughness: f64,
    comfort_scale: &'static str,
}

impl<'a> RequestBody<'a> {
    fn new(req: &'a AnalysisRequest) -> Self {
        Self {
            height_maps: HeightMaps {
                terrain_height_array: &req.terrain,
                building_and_terrain_height_array: &req.augmented,
                min_height: req.min_height,
                max_height: req.max_height,
            },
            wind_rose: &req.wind_rose,
            kind: ANALYSIS_TYPE,
            roughness: req.wind_rose.roughness,
            comfort_scale: COMFORT_SCALE,
        }
    }
}

/// The service answers with either flat or row-nested arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum Grid<T> {
    Flat(Vec<T>),
    Nested(Vec<Vec<T>>),
}

impl<T> Grid<T> {
    fn flatten(self) -> Vec<T> {
        match self {
            Grid::Flat(v) => v,
            Grid::Nested(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

#[derive(Deserialize)]
struct ResponseBody {
    heatmap_data: Grid<Option<f64>>,
    /// `true` marks cells excluded from scoring.
    #[serde(default)]
    heatmap_mask: Option<Grid<bool>>,
}

impl ResponseBody {
    fn into_heatmap(self, expected: usize) -> Result<Heatmap, AnalysisServiceError> {
        let values: Vec<f64> = self
            .heatmap_data
            .flatten()
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        if values.len() != expected {
            return Err(AnalysisServiceError::fatal(format!(
                "heatmap has {} cells, expected {expected}",
                values.len()
            )));
        }
        match self.heatmap_mask {
            Some(mask) => Heatmap::new(values, mask.flatten()),
            None => Ok(Heatmap::unmasked(values)),
        }
    }
}

impl HttpWindAnalysis {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            project: None,
            token: None,
        })
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn from_config(cfg: &AnalysisConfig) -> Result<Self, ConfigError> {
        let endpoint = cfg
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("analysis.endpoint is not set".into()))?;
        let mut client = Self::new(endpoint, cfg.timeout())
            .map_err(|e| ConfigError::Invalid(format!("building http client: {e}")))?;
        if let Some(project) = &cfg.project {
            client = client.with_project(project.clone());
        }
        if let Some(token) = cfg.token() {
            client = client.with_token(token);
        } else {
            log::warn!("no analysis token configured; requests are sent unauthenticated");
        }
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify(e: reqwest::Error) -> AnalysisServiceError {
    if e.is_timeout() || e.is_connect() {
        AnalysisServiceError::transient(format!("analysis request failed: {e}"))
    } else if let Some(status) = e.status() {
        AnalysisServiceError::from_status(status.as_u16(), e.to_string())
    } else {
        AnalysisServiceError::fatal(format!("analysis request failed: {e}"))
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

impl WindComfortAnalysisService for HttpWindAnalysis {
    fn analyze(&self, request: &AnalysisRequest) -> Result<Heatmap, AnalysisServiceError> {
        let t0 = Instant::now();
        let mut query: Vec<(&str, &str)> = vec![
            ("direction", "0"),
            ("analysisType", ANALYSIS_TYPE),
            ("comfortScale", COMFORT_SCALE),
        ];
        if let Some(project) = &self.project {
            query.insert(0, ("authcontext", project.as_str()));
        }
        let mut builder = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .json(&RequestBody::new(request));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisServiceError::from_status(
                status.as_u16(),
                truncate(body),
            ));
        }
        let body: ResponseBody = response.json().map_err(|e| {
            if e.is_timeout() {
                classify(e)
            } else {
                AnalysisServiceError::fatal(format!("malformed analysis response: {e}"))
            }
        })?;
        let heatmap = body.into_heatmap(request.width * request.height)?;
        log::debug!(
            target: "analysis",
            "option {}: {}x{} heatmap in {} ms",
            request.option,
            request.width,
            request.height,
            t0.elapsed().as_millis()
        );
        Ok(heatmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_service_field_names() {
        let req = AnalysisRequest {
            option: 0,
            width: 2,
            height: 2,
            terrain: vec![0.0, 0.5, 1.0, 0.25],
            augmented: vec![0.0, 1.0, 1.0, 0.25],
            min_height: 3.0,
            max_height: 40.0,
            wind_rose: WindRose::default(),
        };
        let json = serde_json::to_value(RequestBody::new(&req)).unwrap();
        assert_eq!(
            json["heightMaps"]["terrainHeightArray"],
            serde_json::json!([0.0, 0.5, 1.0, 0.25])
        );
        let augmented = json["heightMaps"]["buildingAndTerrainHeightArray"].as_array().unwrap();
        assert_eq!(augmented.len(), req.width * req.height);
        assert_eq!(augmented[1], 1.0);
        assert_eq!(json["heightMaps"]["maxHeight"], 40.0);
        assert_eq!(json["type"], "comfort");
        assert_eq!(json["comfortScale"], "lawson_lddc");
        assert_eq!(json["roughness"], 0.4978);
        assert_eq!(json["windRose"]["height"], 100.0);
        assert_eq!(json["windRose"]["data"].as_array().unwrap().len(), 8);
        assert!(json["windRose"]["data"][0]["weibull_scale_parameter"].is_number());
    }

    #[test]
    fn nested_and_flat_responses_decode_alike() {
        let nested: ResponseBody = serde_json::from_str(
            r#"{"heatmap_data": [[1.0, null], [3.0, 4.0]],
                "heatmap_mask": [[false, false], [true, false]]}"#,
        )
        .unwrap();
        let heatmap = nested.into_heatmap(4).unwrap();
        assert_eq!(heatmap.values()[0], 1.0);
        assert!(heatmap.values()[1].is_nan());
        assert_eq!(heatmap.mask(), &[false, false, true, false]);

        let flat: ResponseBody =
            serde_json::from_str(r#"{"heatmap_data": [1.0, 2.0]}"#).unwrap();
        let heatmap = flat.into_heatmap(2).unwrap();
        assert_eq!(heatmap.mask(), &[false, false]);
    }

    #[test]
    fn wrong_cell_count_is_fatal() {
        let body: ResponseBody = serde_json::from_str(r#"{"heatmap_data": [1.0]}"#).unwrap();
        let err = body.into_heatmap(4).unwrap_err();
        assert!(!err.transient);
    }

    #[test]
    fn long_error_bodies_are_cut() {
        assert_eq!(truncate("é".repeat(400)).len(), MAX_ERROR_BODY);
        assert_eq!(truncate("short".into()), "short");
    }
}
