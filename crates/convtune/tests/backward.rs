mod dummy;

use convtune::{
    AlgorithmFamily, BackwardDataAlgorithm, BackwardWeightsAlgorithm, ConvolutionDescriptor,
    ConvolutionError, ConvolutionParams, DataType, Direction, KernelKey, NetworkConfig,
    SearchOptions, Stage, TensorDescriptor, TensorHandleRef, Workspace, backward_bias,
};
use dummy::*;
use pretty_assertions::assert_eq;

/// Large enough to split the batch in two groups for the direct weight gradient.
fn grouped_batch() -> Problem {
    Problem::new([17, 1, 32, 32], [2, 1, 3, 3], ConvolutionParams::new((1, 1), (1, 1), (1, 1)))
}

#[test_log::test]
fn data_gradient_matches_the_reference() {
    let (client, _) = client();
    let problem = Problem::new([2, 3, 9, 10], [4, 3, 3, 3], ConvolutionParams::new((1, 1), (2, 2), (1, 1)));
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (dx_desc, w_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));

    let dy_values = random(dy_desc.element_count(), 1);
    let w_values = random(w_desc.element_count(), 2);
    let dy = upload(&client, &dy_values);
    let w = upload(&client, &w_values);
    let dx = zeros(&client, dx_desc.element_count());

    let results = conv
        .find_backward_data_algorithm(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&w, &w_desc),
            TensorHandleRef::new(&dx, &dx_desc),
            SearchOptions::default(),
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].algorithm, BackwardDataAlgorithm::Direct);
    assert_eq!(results[0].memory, 0);

    conv.backward_data(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&w, &w_desc),
        TensorHandleRef::new(&dx, &dx_desc),
        BackwardDataAlgorithm::Direct,
    )
    .unwrap();

    assert_close(&download(&client, &dx), &problem.backward_data(&dy_values, &w_values));
}

#[test_log::test]
fn large_filter_data_gradient_runs_two_passes() {
    let (client, stats) = client();
    let problem = Problem::new([1, 1, 23, 23], [2, 1, 11, 11], ConvolutionParams::new((5, 5), (1, 1), (1, 1)));
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (dx_desc, w_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));

    let dy_values = random(dy_desc.element_count(), 3);
    let w_values = random(w_desc.element_count(), 4);
    let dy = upload(&client, &dy_values);
    let w = upload(&client, &w_values);
    let dx = zeros(&client, dx_desc.element_count());

    conv.backward_data(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&w, &w_desc),
        TensorHandleRef::new(&dx, &dx_desc),
        BackwardDataAlgorithm::Direct,
    )
    .unwrap();

    let config = NetworkConfig::build(
        Direction::BackwardData,
        &dx_desc,
        &w_desc,
        &dy_desc,
        &problem.params,
    );
    let main = KernelKey::new(AlgorithmFamily::Direct, Stage::Main, 0, &config);
    let second = KernelKey::new(AlgorithmFamily::Direct, Stage::SecondPass, 0, &config);

    assert_eq!(second.config.as_str(), format!("{config}x1"));
    assert!(client.is_compiled(&main.id()));
    assert!(client.is_compiled(&second.id()));
    assert_eq!(stats.launched(), 2);
    assert_close(&download(&client, &dx), &problem.backward_data(&dy_values, &w_values));
}

#[test_log::test]
fn weight_gradient_algorithms_match_the_reference() {
    let (client, _) = client();
    let problem = grouped_batch();
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (x_desc, dw_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));

    let x_values = random(x_desc.element_count(), 5);
    let dy_values = random(dy_desc.element_count(), 6);
    let expected = problem.backward_weights(&dy_values, &x_values);
    let x = upload(&client, &x_values);
    let dy = upload(&client, &dy_values);
    let workspace = client
        .empty(conv.backward_weights_workspace_size(&dy_desc, &x_desc, &dw_desc))
        .unwrap();

    for algorithm in [BackwardWeightsAlgorithm::Gemm, BackwardWeightsAlgorithm::Direct] {
        // Stale values must be overwritten.
        let dw = upload(&client, &vec![7.0; dw_desc.element_count()]);

        conv.backward_weights(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&x, &x_desc),
            TensorHandleRef::new(&dw, &dw_desc),
            algorithm,
            Workspace::new(&workspace),
        )
        .unwrap();

        assert_close(&download(&client, &dw), &expected);
    }
}

#[test_log::test]
fn weight_gradient_search_ranks_both_algorithms() {
    let (client, _) = client();
    let problem = grouped_batch();
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (x_desc, dw_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));
    let x = upload(&client, &random(x_desc.element_count(), 5));
    let dy = upload(&client, &random(dy_desc.element_count(), 6));
    let dw = zeros(&client, dw_desc.element_count());
    let workspace = client
        .empty(conv.backward_weights_workspace_size(&dy_desc, &x_desc, &dw_desc))
        .unwrap();

    let results = conv
        .find_backward_weights_algorithm(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&x, &x_desc),
            TensorHandleRef::new(&dw, &dw_desc),
            Workspace::new(&workspace),
            SearchOptions::new(2, false),
        )
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].time <= results[1].time);

    let direct = results
        .iter()
        .find(|perf| perf.algorithm == BackwardWeightsAlgorithm::Direct)
        .unwrap();
    assert_eq!(
        direct.memory,
        conv.backward_weights_workspace_size_direct(&dy_desc, &x_desc, &dw_desc)
    );

    // Both stages of the direct strategy were compiled and registered.
    let config = NetworkConfig::build(
        Direction::BackwardWeights,
        &x_desc,
        &dw_desc,
        &dy_desc,
        &problem.params,
    );
    for stage in [Stage::Main, Stage::SecondPass] {
        let key = KernelKey::new(AlgorithmFamily::BackwardWeightsDirect, stage, 0, &config);
        assert!(client.is_compiled(&key.id()));
    }
    assert!(download(&client, &dw).iter().all(|value| *value == 0.0));
}

#[test_log::test]
fn short_workspace_launches_nothing() {
    let (client, stats) = client();
    let problem = grouped_batch();
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (x_desc, dw_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));
    let x = upload(&client, &random(x_desc.element_count(), 5));
    let dy = upload(&client, &random(dy_desc.element_count(), 6));
    let dw = zeros(&client, dw_desc.element_count());

    let required = conv.backward_weights_workspace_size_direct(&dy_desc, &x_desc, &dw_desc);
    assert_eq!(required, 2 * 2 * 9 * 4);
    let workspace = client.empty(required).unwrap();

    let err = conv
        .backward_weights(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&x, &x_desc),
            TensorHandleRef::new(&dw, &dw_desc),
            BackwardWeightsAlgorithm::Direct,
            Workspace::with_size(&workspace, required - 1),
        )
        .unwrap_err();

    assert!(matches!(err, ConvolutionError::BadParameter { .. }));
    assert_eq!(stats.submitted(), 0);
    assert_eq!(stats.compiled(), 0);
}

#[test_log::test]
fn small_batches_need_no_direct_workspace() {
    let (client, stats) = client();
    let problem = Problem::new([2, 2, 8, 8], [3, 2, 3, 3], ConvolutionParams::default());
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (x_desc, dw_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));
    assert_eq!(conv.backward_weights_workspace_size_direct(&dy_desc, &x_desc, &dw_desc), 0);

    let x_values = random(x_desc.element_count(), 7);
    let dy_values = random(dy_desc.element_count(), 8);
    let x = upload(&client, &x_values);
    let dy = upload(&client, &dy_values);
    let dw = zeros(&client, dw_desc.element_count());

    conv.backward_weights(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&x, &x_desc),
        TensorHandleRef::new(&dw, &dw_desc),
        BackwardWeightsAlgorithm::Direct,
        Workspace::none(),
    )
    .unwrap();

    assert_eq!(stats.launched(), 1);
    assert_close(&download(&client, &dw), &problem.backward_weights(&dy_values, &x_values));
}

#[test_log::test]
fn tall_filters_have_no_direct_weight_gradient() {
    let (client, _) = client_with(properties(), false);
    let problem = Problem::new([1, 1, 8, 8], [1, 1, 3, 1], ConvolutionParams::default());
    let conv = ConvolutionDescriptor::new(problem.params).unwrap();
    let (x_desc, dw_desc, dy_desc) = (packed(problem.x), packed(problem.w), packed(problem.y()));
    let x = upload(&client, &random(x_desc.element_count(), 1));
    let dy = upload(&client, &random(dy_desc.element_count(), 2));
    let dw = zeros(&client, dw_desc.element_count());

    let err = conv
        .backward_weights(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&x, &x_desc),
            TensorHandleRef::new(&dw, &dw_desc),
            BackwardWeightsAlgorithm::Direct,
            Workspace::none(),
        )
        .unwrap_err();
    assert!(matches!(err, ConvolutionError::Unsupported { .. }));

    let err = conv
        .find_backward_weights_algorithm(
            &client,
            TensorHandleRef::new(&dy, &dy_desc),
            TensorHandleRef::new(&x, &x_desc),
            TensorHandleRef::new(&dw, &dw_desc),
            Workspace::none(),
            SearchOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ConvolutionError::Unsupported { .. }));
}

#[test_log::test]
fn bias_gradient_sums_every_channel() {
    let (client, _) = client();
    let dy_desc = packed([2, 3, 4, 5]);
    let db_desc = packed([1, 3, 1, 1]);
    let dy_values = random(dy_desc.element_count(), 9);
    let dy = upload(&client, &dy_values);
    let db = zeros(&client, 3);

    backward_bias(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&db, &db_desc),
    )
    .unwrap();

    let expected = (0..3)
        .map(|k| {
            (0..2)
                .flat_map(|n| (0..20).map(move |p| (n * 3 + k) * 20 + p))
                .map(|index| dy_values[index])
                .sum::<f32>()
        })
        .collect::<Vec<_>>();
    assert_close(&download(&client, &db), &expected);
}

#[test_log::test]
fn bias_gradient_checks_channels() {
    let (client, stats) = client();
    let dy_desc = packed([2, 3, 4, 5]);
    let db_desc = packed([1, 4, 1, 1]);
    let dy = upload(&client, &random(dy_desc.element_count(), 9));
    let db = zeros(&client, 4);

    let err = backward_bias(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&db, &db_desc),
    )
    .unwrap_err();

    assert!(matches!(err, ConvolutionError::BadParameter { .. }));
    assert_eq!(stats.submitted(), 0);
}

#[test_log::test]
fn bias_gradient_checks_element_types() {
    let (client, stats) = client();
    let dy_desc = packed([2, 3, 4, 5]);
    let db_desc = TensorDescriptor::new_packed(DataType::F16, [1, 3, 1, 1]);
    let dy = upload(&client, &random(dy_desc.element_count(), 9));
    let db = client.empty(db_desc.byte_size()).unwrap();

    let err = backward_bias(
        &client,
        TensorHandleRef::new(&dy, &dy_desc),
        TensorHandleRef::new(&db, &db_desc),
    )
    .unwrap_err();

    assert!(matches!(err, ConvolutionError::BadParameter { .. }));
    assert_eq!(stats.compiled(), 0);
    assert_eq!(stats.submitted(), 0);
}
