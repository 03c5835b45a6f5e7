//! End-to-end tests through the umbrella crate: index a mesh directory,
//! persist it, reload it and query it the way the command-line tool does.

#![cfg(feature = "retrieval")]

use approx::assert_relative_eq;
use shapecrate::prelude::*;
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"
k = 3

[pipeline.histograms]
samples = 1500
seed = 7

[ann]
max_connections = 8
ef_search = 16
"#;

fn tetrahedron(stretch: f32) -> TriangleMesh {
    TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(4.0 * stretch, 0.0, 0.0),
            Point3f::new(0.0, 2.0, 0.0),
            Point3f::new(1.0, 1.0, 1.5),
        ],
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]],
    )
}

fn write_collection(root: &Path) {
    let origin = Point3f::new(0.0, 0.0, 0.0);
    let accessor = FileGeometryAccessor;
    let files: Vec<(&str, TriangleMesh)> = vec![
        ("box/b1.off", box_mesh(origin, Point3f::new(3.0, 2.0, 1.0))),
        ("box/b2.ply", box_mesh(origin, Point3f::new(3.2, 2.1, 0.9))),
        ("tet/t1.obj", tetrahedron(1.0)),
        ("tet/t2.off", tetrahedron(1.1)),
        ("flat/f1.obj", box_mesh(origin, Point3f::new(5.0, 5.0, 0.1))),
        ("flat/f2.off", box_mesh(origin, Point3f::new(6.0, 5.5, 0.12))),
    ];
    for (relative, mesh) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        accessor.save(&path, &mesh).unwrap();
    }
}

#[test]
fn test_index_store_query_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let meshes = dir.path().join("meshes");
    write_collection(&meshes);
    let config_path = dir.path().join("shapecrate.toml");
    fs::write(&config_path, CONFIG).unwrap();
    let config = RetrievalConfig::from_file(&config_path).unwrap();
    assert_eq!(config.k, 3);
    assert_eq!(config.ann.max_connections, 8);

    let (corpus, report) = CorpusBuilder::new(config.pipeline)
        .build_from_directory(&meshes, &CancellationToken::new())
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(corpus.class_sizes().len(), 3);

    let store = CorpusStore::new(dir.path().join("store"));
    corpus.save(&store).unwrap();
    assert!(store.exists());

    let retriever = Retriever::new(Corpus::load(&store).unwrap(), config.clone()).unwrap();

    for shape in retriever.corpus().iter() {
        for h in shape.histograms.unwrap().histograms.iter() {
            assert_eq!(h.bins.len(), HISTOGRAM_BINS);
            assert!(h.bins.iter().all(|b| *b >= 0.0));
            assert_relative_eq!(h.total(), 1.0, epsilon = 1e-6);
        }
    }

    let query = meshes.join("tet/t1.obj");
    let exact = retriever.query_default(&query, false, &CancellationToken::new()).unwrap();
    assert_eq!(exact.len(), 3);
    assert_eq!(exact[0].id, ShapeId::from("tet/t1.obj"));
    assert_eq!(exact[0].distance, 0.0);

    let approx = retriever.query_default(&query, true, &CancellationToken::new()).unwrap();
    assert_eq!(approx, exact);

    let evaluation = Evaluator::new(config.k)
        .evaluate_retriever(&retriever, &config.weights, false, &CancellationToken::new())
        .unwrap();
    assert_eq!(evaluation.corpus_size, 6);
    for class in &evaluation.classes {
        assert_eq!(class.class_size, 2);
        assert_relative_eq!(class.counts.total(), 6.0, epsilon = 1e-9);
        assert!(class.counts.true_positives >= 1.0);
    }
}

#[test]
fn test_unsupported_query_format() {
    let dir = tempfile::tempdir().unwrap();
    let (corpus, _) = CorpusBuilder::new(PipelineConfig::default())
        .build_from_meshes(
            vec![(
                ShapeId::from("box/b.off"),
                "box".to_string(),
                box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 2.0, 3.0)),
            )],
            &CancellationToken::new(),
        )
        .unwrap();
    let retriever = Retriever::new(corpus, RetrievalConfig::default()).unwrap();

    let stl = dir.path().join("query.stl");
    fs::write(&stl, "solid q\nendsolid q\n").unwrap();
    assert!(matches!(
        retriever.query_default(&stl, false, &CancellationToken::new()),
        Err(Error::GeometryLoad { .. })
    ));
}
