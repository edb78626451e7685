//! Serialization of an [`ExportJob`] into the engine's expression graph.
//!
//! The graph is a table of value nodes keyed by id. Nested invocations are
//! written inline; mapped functions need their body in the table because a
//! function definition refers to it by id.

use serde_json::{Map, Value, json};

use crate::domain::{Aggregation, Reducer};
use crate::job::ExportJob;

const MAPPING_VAR: &str = "_MAPPING_VAR_0_0";

#[derive(Debug, Default)]
struct Graph {
    values: Map<String, Value>,
}

impl Graph {
    fn push(&mut self, node: Value) -> String {
        let id = self.values.len().to_string();
        self.values.insert(id.clone(), node);
        id
    }

    /// Registers `body` and returns a one-argument function definition over it.
    fn lambda(&mut self, body: Value) -> Value {
        let body_id = self.push(body);
        json!({
            "functionDefinitionValue": {
                "argumentNames": [MAPPING_VAR],
                "body": body_id,
            }
        })
    }

    fn finish(mut self, result: Value) -> Value {
        let result_id = self.push(result);
        json!({ "result": result_id, "values": self.values })
    }
}

fn constant(value: impl Into<Value>) -> Value {
    json!({ "constantValue": value.into() })
}

fn argument() -> Value {
    json!({ "argumentReference": MAPPING_VAR })
}

fn invoke(function: &str, arguments: Vec<(&str, Value)>) -> Value {
    let arguments = arguments
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect::<Map<_, _>>();
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

fn reducer(reducer: Reducer) -> Value {
    invoke(reducer.algorithm(), Vec::new())
}

fn map(graph: &mut Graph, collection: Value, body: Value) -> Value {
    let function = graph.lambda(body);
    invoke(
        "Collection.map",
        vec![("collection", collection), ("baseAlgorithm", function)],
    )
}

pub fn build_expression(job: &ExportJob) -> Value {
    let mut graph = Graph::default();
    let source = &job.raster.source;

    let collection = invoke(
        "ImageCollection.load",
        vec![("id", constant(source.collection_id.as_str()))],
    );
    let date_range = invoke(
        "DateRange",
        vec![
            ("start", constant(source.window.start().to_string())),
            ("end", constant(source.window.end().to_string())),
        ],
    );
    let filtered = invoke(
        "Collection.filter",
        vec![
            ("collection", collection),
            (
                "filter",
                invoke(
                    "Filter.dateRangeContains",
                    vec![
                        ("leftValue", date_range),
                        ("rightField", constant("system:time_start")),
                    ],
                ),
            ),
        ],
    );
    let selected = map(
        &mut graph,
        filtered,
        invoke(
            "Image.select",
            vec![
                ("input", argument()),
                ("bandSelectors", constant(vec![source.band.clone()])),
            ],
        ),
    );

    let composite = match job.raster.composite {
        Aggregation::Mean => invoke(
            "ImageCollection.reduce",
            vec![("collection", selected), ("reducer", reducer(Reducer::Mean))],
        ),
        Aggregation::Sum => invoke(
            "ImageCollection.reduce",
            vec![("collection", selected), ("reducer", reducer(Reducer::Sum))],
        ),
        Aggregation::ThresholdCount => {
            let detections = map(
                &mut graph,
                selected,
                invoke(
                    "Image.gt",
                    vec![
                        ("image1", argument()),
                        ("image2", invoke("Image.constant", vec![("value", constant(0))])),
                    ],
                ),
            );
            invoke(
                "ImageCollection.reduce",
                vec![("collection", detections), ("reducer", reducer(Reducer::Sum))],
            )
        }
    };

    let zonal = invoke(
        "Image.reduceRegions",
        vec![
            ("image", composite),
            (
                "collection",
                invoke(
                    "FeatureCollection.load",
                    vec![("tableId", constant(job.regions.as_str()))],
                ),
            ),
            ("reducer", reducer(job.reducer)),
            ("scale", constant(job.scale)),
        ],
    );

    let tags = json!({
        "year": job.tags.year,
        "month": job.tags.month,
        "variable": job.tags.variable,
    });
    let tagged = map(
        &mut graph,
        zonal,
        invoke(
            "Element.setMulti",
            vec![("object", argument()), ("properties", constant(tags))],
        ),
    );

    graph.finish(tagged)
}

/// Request body for a table export of `job` into `bucket`.
pub fn export_request(job: &ExportJob, bucket: &str) -> Value {
    json!({
        "expression": build_expression(job),
        "description": job.description(),
        "fileExportOptions": {
            "fileFormat": job.format.engine_name(),
            "cloudStorageDestination": {
                "bucket": bucket,
                "filenamePrefix": job.file_prefix,
            },
        },
    })
}
